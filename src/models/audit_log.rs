use crate::adapter::Executor;
use crate::entity::{Entity, Model};
use crate::error::PersistError;
use crate::schema::{ColumnDescriptor, SchemaRegistry};
use crate::value::{Row, Value};

/// Append-only record of mutations on other entities.
pub struct AuditLog;

impl Model for AuditLog {
    const ENTITY_TYPE: &'static str = "AuditLog";
    const TABLE: &'static str = "audit_logs";

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::primary("id"),
            ColumnDescriptor::string("entity").not_null(),
            ColumnDescriptor::string("entity_id").not_null(),
            ColumnDescriptor::string("action").not_null(),
            ColumnDescriptor::datetime("created_at").not_null().default_expr("NOW()"),
        ]
    }
}

impl AuditLog {
    /// Insert one audit entry for `action` on `entity`/`entity_id`.
    pub async fn record(
        registry: &SchemaRegistry,
        db: &dyn Executor,
        entity: &str,
        entity_id: &Value,
        action: &str,
    ) -> Result<Entity<AuditLog>, PersistError> {
        let attrs: Row = [
            ("entity".to_string(), Value::from(entity)),
            ("entity_id".to_string(), Value::Text(entity_id.to_string())),
            ("action".to_string(), Value::from(action)),
        ]
        .into_iter()
        .collect();
        let mut log = Entity::<AuditLog>::new(registry, attrs);
        log.save(db).await?;
        Ok(log)
    }
}
