//! Column descriptors and the per-entity schema snapshot.

use crate::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Primary,
    String,
    Email,
    Boolean,
    DateTime,
    SoftDeleteTimestamp,
}

impl ColumnKind {
    /// PostgreSQL storage type used for DDL.
    pub fn pg_type(self) -> &'static str {
        match self {
            ColumnKind::Primary => "UUID",
            ColumnKind::String | ColumnKind::Email => "TEXT",
            ColumnKind::Boolean => "BOOLEAN",
            ColumnKind::DateTime | ColumnKind::SoftDeleteTimestamp => "TIMESTAMPTZ",
        }
    }
}

/// Column default: a literal value or a raw SQL expression (e.g. `NOW()`). Only used for DDL.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnDefault {
    Literal(Value),
    Expression(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnOptions {
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<ColumnDefault>,
}

impl Default for ColumnOptions {
    fn default() -> Self {
        ColumnOptions {
            nullable: true,
            unique: false,
            default: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<ColumnDefault>,
}

impl ColumnDescriptor {
    pub fn new(name: &str, kind: ColumnKind, options: ColumnOptions) -> Self {
        ColumnDescriptor {
            name: name.to_string(),
            kind,
            // Primary keys are never nullable.
            nullable: options.nullable && kind != ColumnKind::Primary,
            unique: options.unique,
            default: options.default,
        }
    }

    fn of(name: &str, kind: ColumnKind) -> Self {
        Self::new(name, kind, ColumnOptions::default())
    }

    pub fn primary(name: &str) -> Self {
        Self::of(name, ColumnKind::Primary)
    }

    pub fn string(name: &str) -> Self {
        Self::of(name, ColumnKind::String)
    }

    pub fn email(name: &str) -> Self {
        Self::of(name, ColumnKind::Email)
    }

    pub fn boolean(name: &str) -> Self {
        Self::of(name, ColumnKind::Boolean)
    }

    pub fn datetime(name: &str) -> Self {
        Self::of(name, ColumnKind::DateTime)
    }

    pub fn soft_delete(name: &str) -> Self {
        Self::of(name, ColumnKind::SoftDeleteTimestamp)
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, v: impl Into<Value>) -> Self {
        self.default = Some(ColumnDefault::Literal(v.into()));
        self
    }

    pub fn default_expr(mut self, expression: &str) -> Self {
        self.default = Some(ColumnDefault::Expression(expression.to_string()));
        self
    }
}

/// Immutable snapshot of one entity type's columns. Registration replaces the snapshot
/// instead of mutating it.
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    entity_type: String,
    table: String,
    columns: Vec<ColumnDescriptor>,
}

impl Schema {
    /// Empty schema; the table name defaults to the entity type until registration sets it.
    pub fn empty(entity_type: &str) -> Self {
        Schema {
            entity_type: entity_type.to_string(),
            table: entity_type.to_string(),
            columns: Vec::new(),
        }
    }

    pub(crate) fn with_table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    pub(crate) fn columns_mut(&mut self) -> &mut Vec<ColumnDescriptor> {
        &mut self.columns
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn primary_key(&self) -> Option<&ColumnDescriptor> {
        find_primary_key(self)
    }

    pub fn soft_delete_column(&self) -> Option<&ColumnDescriptor> {
        find_soft_delete_column(self)
    }

    /// Whether deletes on this entity are soft (UPDATE of a timestamp) rather than row removal.
    pub fn has_soft_delete(&self) -> bool {
        self.soft_delete_column().is_some()
    }
}

/// The schema's Primary column, if one is declared.
pub fn find_primary_key(schema: &Schema) -> Option<&ColumnDescriptor> {
    schema.columns.iter().find(|c| c.kind == ColumnKind::Primary)
}

/// The schema's SoftDeleteTimestamp column, if one is declared.
pub fn find_soft_delete_column(schema: &Schema) -> Option<&ColumnDescriptor> {
    schema
        .columns
        .iter()
        .find(|c| c.kind == ColumnKind::SoftDeleteTimestamp)
}
