//! Active-record entities: attribute maps bound to a registered schema that persist
//! themselves through an `Executor`. Entities never hold a connection.

use crate::adapter::Executor;
use crate::error::{PersistError, SchemaError, ValidationErrors};
use crate::schema::{ColumnDescriptor, ColumnKind, Schema, SchemaRegistry};
use crate::sql::{self, Filter, FindOptions};
use crate::value::{Row, Value};
use regex::Regex;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock};

/// An entity type: its registry key, table, and ordered columns.
pub trait Model: Send + Sync + 'static {
    const ENTITY_TYPE: &'static str;
    const TABLE: &'static str;

    fn columns() -> Vec<ColumnDescriptor>;

    /// Register this model's schema. Called once at startup.
    fn register(registry: &SchemaRegistry) -> Result<Arc<Schema>, SchemaError> {
        registry.register(Self::ENTITY_TYPE, Self::TABLE, Self::columns())
    }
}

/// Lifecycle of one entity instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityState {
    /// No primary-key value yet.
    Transient,
    /// Persisted; soft-delete column (if any) is null.
    Active,
    /// Persisted; soft-delete column holds a timestamp.
    SoftDeleted,
    /// Row removed. Terminal.
    HardDeleted,
}

impl EntityState {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityState::Transient => "transient",
            EntityState::Active => "active",
            EntityState::SoftDeleted => "soft-deleted",
            EntityState::HardDeleted => "hard-deleted",
        }
    }
}

/// How `delete()` removes an entity of a given schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletePlan<'a> {
    /// UPDATE the soft-delete column to the current time.
    Soft { column: &'a str },
    /// DELETE the row by primary key.
    Hard,
}

/// The one place soft versus hard delete is decided.
pub fn delete_plan(schema: &Schema) -> DeletePlan<'_> {
    match schema.soft_delete_column() {
        Some(c) => DeletePlan::Soft { column: &c.name },
        None => DeletePlan::Hard,
    }
}

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

fn is_email(s: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|re| re.is_match(s))
}

fn check_kind(column: &ColumnDescriptor, value: &Value) -> Option<&'static str> {
    match (column.kind, value) {
        (ColumnKind::Primary, Value::Int(_) | Value::Uuid(_)) => None,
        (ColumnKind::Primary, Value::Text(s)) if !s.is_empty() => None,
        (ColumnKind::Primary, _) => Some("must be a numeric or identifier value"),
        (ColumnKind::String, Value::Text(_)) => None,
        (ColumnKind::String, _) => Some("must be a string"),
        (ColumnKind::Email, Value::Text(s)) if is_email(s) => None,
        (ColumnKind::Email, Value::Text(_)) => Some("must be a valid email address"),
        (ColumnKind::Email, _) => Some("must be a string"),
        (ColumnKind::Boolean, Value::Bool(_)) => None,
        (ColumnKind::Boolean, _) => Some("must be a boolean"),
        (ColumnKind::DateTime | ColumnKind::SoftDeleteTimestamp, Value::Timestamp(_)) => None,
        (ColumnKind::DateTime | ColumnKind::SoftDeleteTimestamp, _) => Some("must be a date-time"),
    }
}

/// Check every attribute against its column. Collects all failures.
pub fn validate(schema: &Schema, attributes: &Row) -> Result<(), PersistError> {
    check_attributes(schema, attributes).into_result()
}

/// `validate`, plus every column an INSERT must supply: not nullable, no default,
/// not the key.
pub fn validate_insert(schema: &Schema, attributes: &Row) -> Result<(), PersistError> {
    let mut errors = check_attributes(schema, attributes);
    for column in schema.columns() {
        let required =
            !column.nullable && column.default.is_none() && column.kind != ColumnKind::Primary;
        if required && !attributes.contains_key(&column.name) {
            errors.add(&column.name, "is required");
        }
    }
    errors.into_result()
}

fn check_attributes(schema: &Schema, attributes: &Row) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    for (name, value) in attributes {
        let Some(column) = schema.column(name) else {
            errors.add(name, format!("is not a column of {}", schema.entity_type()));
            continue;
        };
        if value.is_null() {
            if !column.nullable {
                errors.add(name, "must not be null");
            }
            continue;
        }
        if let Some(msg) = check_kind(column, value) {
            errors.add(name, msg);
        }
    }
    errors
}

fn state_of(schema: &Schema, attributes: &Row) -> EntityState {
    let has_id = schema
        .primary_key()
        .and_then(|pk| attributes.get(&pk.name))
        .is_some_and(|v| !v.is_null());
    if !has_id {
        return EntityState::Transient;
    }
    let deleted = schema
        .soft_delete_column()
        .and_then(|c| attributes.get(&c.name))
        .is_some_and(|v| !v.is_null());
    if deleted {
        EntityState::SoftDeleted
    } else {
        EntityState::Active
    }
}

pub struct Entity<M: Model> {
    schema: Arc<Schema>,
    attributes: Row,
    state: EntityState,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for Entity<M> {
    fn clone(&self) -> Self {
        Entity {
            schema: Arc::clone(&self.schema),
            attributes: self.attributes.clone(),
            state: self.state,
            _model: PhantomData,
        }
    }
}

impl<M: Model> fmt::Debug for Entity<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &M::ENTITY_TYPE)
            .field("state", &self.state)
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl<M: Model> Entity<M> {
    /// New instance from caller-supplied attributes. Transient unless a primary-key
    /// value is supplied, in which case it refers to an existing row.
    pub fn new(registry: &SchemaRegistry, attributes: Row) -> Self {
        let schema = registry.get_schema(M::ENTITY_TYPE);
        let state = state_of(&schema, &attributes);
        Entity {
            schema,
            attributes,
            state,
            _model: PhantomData,
        }
    }

    /// Materialize a row returned by the adapter.
    fn from_row(schema: &Arc<Schema>, row: Row) -> Self {
        let state = match state_of(schema, &row) {
            // Rows without a key (e.g. projections) are still persisted rows.
            EntityState::Transient => EntityState::Active,
            s => s,
        };
        Entity {
            schema: Arc::clone(schema),
            attributes: row,
            state,
            _model: PhantomData,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn is_soft_deleted(&self) -> bool {
        self.state == EntityState::SoftDeleted
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Primary-key value, if assigned.
    pub fn id(&self) -> Option<&Value> {
        let pk = self.schema.primary_key()?;
        self.attributes.get(&pk.name).filter(|v| !v.is_null())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    fn ensure_live(&self) -> Result<(), PersistError> {
        if self.state == EntityState::HardDeleted {
            return Err(PersistError::InvalidState {
                entity: M::ENTITY_TYPE.to_string(),
                state: self.state.as_str(),
            });
        }
        Ok(())
    }

    fn primary_key(&self) -> Result<&ColumnDescriptor, SchemaError> {
        self.schema
            .primary_key()
            .ok_or_else(|| SchemaError::MissingPrimaryKey(M::ENTITY_TYPE.to_string()))
    }

    /// Primary-key column name and value, both required.
    fn key(&self) -> Result<(String, Value), SchemaError> {
        let pk = self.primary_key()?.name.clone();
        let id = self
            .id()
            .cloned()
            .ok_or_else(|| SchemaError::MissingPrimaryKeyValue(M::ENTITY_TYPE.to_string()))?;
        Ok((pk, id))
    }

    /// Validate, then INSERT (no key yet) or UPDATE (key set). Validation failures do no I/O.
    pub async fn save(&mut self, db: &dyn Executor) -> Result<(), PersistError> {
        self.ensure_live()?;
        let pk = self.primary_key()?.name.clone();
        match self.id() {
            None => validate_insert(&self.schema, &self.attributes)?,
            Some(_) => validate(&self.schema, &self.attributes)?,
        }

        match self.id().cloned() {
            None => {
                let q = sql::insert(self.schema.table(), &self.attributes, Some(&pk));
                let done = db.execute(&q).await?;
                if let Some(id) = done.returned {
                    self.attributes.insert(pk, id);
                }
                tracing::debug!(entity = M::ENTITY_TYPE, id = ?self.id(), "inserted");
            }
            Some(id) => {
                let Some(q) = sql::update(self.schema.table(), &self.attributes, &pk, &id) else {
                    return Ok(());
                };
                db.execute(&q).await?;
                tracing::debug!(entity = M::ENTITY_TYPE, id = %id, "updated");
            }
        }
        self.state = state_of(&self.schema, &self.attributes);
        Ok(())
    }

    /// Replace the attributes with the stored row, picking up database defaults.
    /// Soft-deleted rows are read too. A row that no longer exists is reported as
    /// `RowNotFound`.
    pub async fn reload(&mut self, db: &dyn Executor) -> Result<(), PersistError> {
        self.ensure_live()?;
        let (pk, id) = self.key()?;
        let q = sql::find_one(
            self.schema.table(),
            &Filter::new().eq(&pk, id),
            None,
            &FindOptions::with_deleted(),
        );
        let row = db.fetch_one(&q).await?.ok_or(sqlx::Error::RowNotFound)?;
        self.state = state_of(&self.schema, &row);
        self.attributes = row;
        Ok(())
    }

    /// Soft delete (UPDATE of the soft-delete column) when the schema has one; hard DELETE otherwise.
    pub async fn delete(&mut self, db: &dyn Executor) -> Result<(), PersistError> {
        self.ensure_live()?;
        let (pk, id) = self.key()?;
        let schema = Arc::clone(&self.schema);
        match delete_plan(&schema) {
            DeletePlan::Soft { column } => {
                let now = Value::Timestamp(chrono::Utc::now());
                let data: Row = [(column.to_string(), now.clone())].into_iter().collect();
                if let Some(q) = sql::update(schema.table(), &data, &pk, &id) {
                    db.execute(&q).await?;
                }
                self.attributes.insert(column.to_string(), now);
                self.state = EntityState::SoftDeleted;
                tracing::debug!(entity = M::ENTITY_TYPE, id = %id, "soft deleted");
            }
            DeletePlan::Hard => {
                let q = sql::delete(schema.table(), &Filter::new().eq(&pk, id.clone()));
                db.execute(&q).await?;
                self.state = EntityState::HardDeleted;
                tracing::debug!(entity = M::ENTITY_TYPE, id = %id, "deleted");
            }
        }
        Ok(())
    }

    /// Clear the soft-delete column. Requires a soft-delete schema and a key.
    pub async fn restore(&mut self, db: &dyn Executor) -> Result<(), PersistError> {
        self.ensure_live()?;
        let schema = Arc::clone(&self.schema);
        let DeletePlan::Soft { column } = delete_plan(&schema) else {
            return Err(SchemaError::NoSoftDeleteColumn(M::ENTITY_TYPE.to_string()).into());
        };
        let (pk, id) = self.key()?;
        let data: Row = [(column.to_string(), Value::Null)].into_iter().collect();
        if let Some(q) = sql::update(schema.table(), &data, &pk, &id) {
            db.execute(&q).await?;
        }
        self.attributes.insert(column.to_string(), Value::Null);
        self.state = EntityState::Active;
        tracing::debug!(entity = M::ENTITY_TYPE, id = %id, "restored");
        Ok(())
    }

    fn soft_delete_name(schema: &Schema) -> Option<&str> {
        schema.soft_delete_column().map(|c| c.name.as_str())
    }

    /// Rows matching `filter`; soft-deleted rows excluded unless `options.include_deleted`.
    pub async fn find(
        registry: &SchemaRegistry,
        db: &dyn Executor,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Self>, PersistError> {
        let schema = registry.get_schema(M::ENTITY_TYPE);
        let q = sql::find(schema.table(), filter, Self::soft_delete_name(&schema), options);
        let rows = db.fetch_all(&q).await?;
        Ok(rows.into_iter().map(|r| Self::from_row(&schema, r)).collect())
    }

    pub async fn find_one(
        registry: &SchemaRegistry,
        db: &dyn Executor,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Option<Self>, PersistError> {
        let schema = registry.get_schema(M::ENTITY_TYPE);
        let q = sql::find_one(schema.table(), filter, Self::soft_delete_name(&schema), options);
        let row = db.fetch_one(&q).await?;
        Ok(row.map(|r| Self::from_row(&schema, r)))
    }

    /// Lookup by primary key.
    pub async fn find_by_id(
        registry: &SchemaRegistry,
        db: &dyn Executor,
        id: impl Into<Value>,
        include_deleted: bool,
    ) -> Result<Option<Self>, PersistError> {
        let schema = registry.get_schema(M::ENTITY_TYPE);
        let pk = schema
            .primary_key()
            .ok_or_else(|| SchemaError::MissingPrimaryKey(M::ENTITY_TYPE.to_string()))?;
        let options = FindOptions {
            include_deleted,
            ..FindOptions::default()
        };
        Self::find_one(registry, db, &Filter::new().eq(&pk.name, id), &options).await
    }

    pub async fn all(
        registry: &SchemaRegistry,
        db: &dyn Executor,
        options: &FindOptions,
    ) -> Result<Vec<Self>, PersistError> {
        Self::find(registry, db, &Filter::new(), options).await
    }

    pub async fn count(
        registry: &SchemaRegistry,
        db: &dyn Executor,
        filter: &Filter,
        include_deleted: bool,
    ) -> Result<u64, PersistError> {
        let schema = registry.get_schema(M::ENTITY_TYPE);
        let q = sql::count(schema.table(), filter, Self::soft_delete_name(&schema), include_deleted);
        let n = db
            .fetch_one(&q)
            .await?
            .and_then(|row| row.get("count").and_then(Value::as_i64))
            .unwrap_or(0);
        Ok(u64::try_from(n).unwrap_or(0))
    }

    pub async fn exists(
        registry: &SchemaRegistry,
        db: &dyn Executor,
        filter: &Filter,
        include_deleted: bool,
    ) -> Result<bool, PersistError> {
        let schema = registry.get_schema(M::ENTITY_TYPE);
        let q = sql::exists(schema.table(), filter, Self::soft_delete_name(&schema), include_deleted);
        Ok(db.fetch_one(&q).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDescriptor;

    fn schema() -> Arc<Schema> {
        let reg = SchemaRegistry::new();
        reg.register(
            "User",
            "users",
            vec![
                ColumnDescriptor::primary("id"),
                ColumnDescriptor::string("name").not_null(),
                ColumnDescriptor::email("email"),
                ColumnDescriptor::boolean("is_active"),
                ColumnDescriptor::datetime("created_at"),
                ColumnDescriptor::soft_delete("deleted_at"),
            ],
        )
        .unwrap()
    }

    fn row(pairs: Vec<(&str, Value)>) -> Row {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn valid_attributes_pass() {
        let attrs = row(vec![
            ("name", "Ada".into()),
            ("email", "ada@example.com".into()),
            ("is_active", true.into()),
            ("created_at", chrono::Utc::now().into()),
            ("deleted_at", Value::Null),
        ]);
        assert!(validate(&schema(), &attrs).is_ok());
    }

    #[test]
    fn every_failure_is_reported() {
        let attrs = row(vec![
            ("name", Value::Null),
            ("email", "not-an-email".into()),
            ("is_active", "yes".into()),
            ("created_at", "2024-01-01".into()),
            ("nickname", "ada".into()),
        ]);
        let Err(PersistError::Validation(errors)) = validate(&schema(), &attrs) else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("name"), Some(&["must not be null".to_string()][..]));
        assert_eq!(errors.get("email"), Some(&["must be a valid email address".to_string()][..]));
        assert_eq!(errors.get("is_active"), Some(&["must be a boolean".to_string()][..]));
        assert_eq!(errors.get("created_at"), Some(&["must be a date-time".to_string()][..]));
        assert!(errors.get("nickname").is_some());
    }

    #[test]
    fn insert_requires_columns_without_defaults() {
        let reg = SchemaRegistry::new();
        let s = reg
            .register(
                "Tenant",
                "tenants",
                vec![
                    ColumnDescriptor::primary("id"),
                    ColumnDescriptor::string("name").not_null(),
                    ColumnDescriptor::email("email").not_null(),
                    ColumnDescriptor::boolean("is_active").not_null().default_value(true),
                    ColumnDescriptor::string("note"),
                ],
            )
            .unwrap();
        let attrs = row(vec![("email", "info@acme.com".into())]);
        assert!(validate(&s, &attrs).is_ok());
        let Err(PersistError::Validation(errors)) = validate_insert(&s, &attrs) else {
            panic!("expected validation error");
        };
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["name"]);
        assert_eq!(errors.get("name"), Some(&["is required".to_string()][..]));

        let full = row(vec![("name", "Acme".into()), ("email", "info@acme.com".into())]);
        assert!(validate_insert(&s, &full).is_ok());
    }

    #[test]
    fn primary_accepts_numbers_and_identifiers() {
        let s = schema();
        assert!(validate(&s, &row(vec![("id", Value::Int(5))])).is_ok());
        assert!(validate(&s, &row(vec![("id", uuid::Uuid::new_v4().into())])).is_ok());
        assert!(validate(&s, &row(vec![("id", "abc".into())])).is_ok());
        assert!(validate(&s, &row(vec![("id", "".into())])).is_err());
        assert!(validate(&s, &row(vec![("id", true.into())])).is_err());
    }

    #[test]
    fn email_pattern() {
        assert!(is_email("info@acme.com"));
        assert!(!is_email("info@acme"));
        assert!(!is_email("in fo@acme.com"));
        assert!(!is_email("@acme.com"));
    }

    #[test]
    fn delete_plan_follows_schema() {
        assert_eq!(delete_plan(&schema()), DeletePlan::Soft { column: "deleted_at" });
        let reg = SchemaRegistry::new();
        let plain = reg
            .register("Tenant", "tenants", vec![ColumnDescriptor::primary("id")])
            .unwrap();
        assert_eq!(delete_plan(&plain), DeletePlan::Hard);
    }

    #[test]
    fn state_derives_from_key_and_marker() {
        let s = schema();
        assert_eq!(state_of(&s, &row(vec![("name", "x".into())])), EntityState::Transient);
        assert_eq!(state_of(&s, &row(vec![("id", Value::Null)])), EntityState::Transient);
        assert_eq!(state_of(&s, &row(vec![("id", Value::Int(1))])), EntityState::Active);
        assert_eq!(
            state_of(&s, &row(vec![("id", Value::Int(1)), ("deleted_at", chrono::Utc::now().into())])),
            EntityState::SoftDeleted
        );
    }
}
