//! Column values carried by entities, filters, and bound query parameters.

use crate::schema::ColumnKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// One row or attribute set: column name -> value, in column order.
pub type Row = indexmap::IndexMap<String, Value>;

/// A single column value. Never rendered into SQL text; always bound as a parameter.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(uuid::Uuid),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Short type name used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "number",
            Value::Text(_) => "string",
            Value::Uuid(_) => "uuid",
            Value::Timestamp(_) => "timestamp",
        }
    }

    /// Kind-blind conversion from JSON. Arrays and objects are kept as their JSON text.
    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    n.as_f64().map(Value::Float).unwrap_or(Value::Null)
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        }
    }

    /// Conversion from JSON guided by the target column kind: strings become uuids for
    /// primary keys and timestamps for date columns when they parse. Anything that does
    /// not parse is left as-is so entity validation reports it.
    pub fn from_json_for(kind: ColumnKind, v: &serde_json::Value) -> Value {
        let Some(s) = v.as_str() else {
            return Value::from_json(v);
        };
        match kind {
            ColumnKind::Primary => uuid::Uuid::parse_str(s)
                .map(Value::Uuid)
                .unwrap_or_else(|_| Value::Text(s.to_string())),
            ColumnKind::DateTime | ColumnKind::SoftDeleteTimestamp => DateTime::parse_from_rfc3339(s)
                .map(|d| Value::Timestamp(d.with_timezone(&Utc)))
                .unwrap_or_else(|_| Value::Text(s.to_string())),
            _ => Value::Text(s.to_string()),
        }
    }

    /// Parse a query-string value for a column of the given kind.
    pub fn parse_for(kind: ColumnKind, s: &str) -> Value {
        match kind {
            ColumnKind::Boolean => match s.to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::Text(s.to_string()),
            },
            ColumnKind::Primary => {
                if let Ok(u) = uuid::Uuid::parse_str(s) {
                    Value::Uuid(u)
                } else if let Ok(n) = s.parse::<i64>() {
                    Value::Int(n)
                } else {
                    Value::Text(s.to_string())
                }
            }
            _ => Value::from_json_for(kind, &serde_json::Value::String(s.to_string())),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Timestamp(t) => f.write_str(&t.to_rfc3339()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(u: uuid::Uuid) -> Self {
        Value::Uuid(u)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
