//! Create tables for registered schemas: one table per entity type, column names identical
//! to schema column names.

use crate::adapter::Executor;
use crate::error::PersistError;
use crate::schema::{ColumnDefault, ColumnDescriptor, ColumnKind, Schema, SchemaRegistry};
use crate::sql::{quoted, QueryBuf};
use crate::value::Value;

/// DDL literal for a column default. Defaults come from code, never from requests.
fn literal(v: &Value) -> String {
    match v {
        Value::Null => "NULL".into(),
        Value::Bool(true) => "TRUE".into(),
        Value::Bool(false) => "FALSE".into(),
        Value::Int(n) => n.to_string(),
        Value::Float(n) => n.to_string(),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

fn column_def(c: &ColumnDescriptor) -> String {
    let mut def = format!("{} {}", quoted(&c.name), c.kind.pg_type());
    if c.kind == ColumnKind::Primary {
        def.push_str(" PRIMARY KEY");
    } else if !c.nullable {
        def.push_str(" NOT NULL");
    }
    if c.unique && c.kind != ColumnKind::Primary {
        def.push_str(" UNIQUE");
    }
    match (&c.default, c.kind) {
        (Some(ColumnDefault::Literal(v)), _) => {
            def.push_str(" DEFAULT ");
            def.push_str(&literal(v));
        }
        (Some(ColumnDefault::Expression(expr)), _) => {
            def.push_str(" DEFAULT ");
            def.push_str(expr);
        }
        (None, ColumnKind::Primary) => def.push_str(" DEFAULT gen_random_uuid()"),
        (None, _) => {}
    }
    def
}

/// `CREATE TABLE IF NOT EXISTS` for one schema; `None` for a schema with no columns.
pub fn create_table_sql(schema: &Schema) -> Option<String> {
    if schema.is_empty() {
        return None;
    }
    let cols: Vec<String> = schema.columns().iter().map(column_def).collect();
    Some(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quoted(schema.table()),
        cols.join(", ")
    ))
}

/// Create every registered table that does not exist yet. Existing tables are left as-is.
pub async fn apply_migrations(db: &dyn Executor, registry: &SchemaRegistry) -> Result<(), PersistError> {
    for entity_type in registry.entity_types() {
        let schema = registry.get_schema(&entity_type);
        let Some(ddl) = create_table_sql(&schema) else {
            continue;
        };
        db.execute(&QueryBuf::raw(&ddl)).await?;
        tracing::info!(entity = %entity_type, table = schema.table(), "table ensured");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_reflects_descriptors() {
        let reg = SchemaRegistry::new();
        let s = reg
            .register(
                "User",
                "users",
                vec![
                    ColumnDescriptor::primary("id"),
                    ColumnDescriptor::email("email").not_null().unique(),
                    ColumnDescriptor::boolean("is_active").not_null().default_value(true),
                    ColumnDescriptor::string("note").default_value("it's"),
                    ColumnDescriptor::datetime("created_at").not_null().default_expr("NOW()"),
                    ColumnDescriptor::soft_delete("deleted_at"),
                ],
            )
            .unwrap();
        assert_eq!(
            create_table_sql(&s).unwrap(),
            "CREATE TABLE IF NOT EXISTS \"users\" (\
             \"id\" UUID PRIMARY KEY DEFAULT gen_random_uuid(), \
             \"email\" TEXT NOT NULL UNIQUE, \
             \"is_active\" BOOLEAN NOT NULL DEFAULT TRUE, \
             \"note\" TEXT DEFAULT 'it''s', \
             \"created_at\" TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
             \"deleted_at\" TIMESTAMPTZ)"
        );
    }

    #[test]
    fn empty_schema_has_no_table() {
        assert!(create_table_sql(&Schema::empty("Nothing")).is_none());
    }
}
