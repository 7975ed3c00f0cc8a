//! Transactional CRUD over registered entities. Every mutation and its audit entry commit
//! or roll back together.

use crate::adapter::{ConnectionAdapter, Executor};
use crate::entity::{self, Entity, Model};
use crate::error::{PersistError, SchemaError, ValidationErrors};
use crate::models::AuditLog;
use crate::schema::{ColumnKind, Schema, SchemaRegistry};
use crate::sql::{Filter, FindOptions};
use crate::transaction::TransactionManager;
use crate::value::{Row, Value};
use std::sync::Arc;

/// Stamped with the current time on every update when the schema has it.
const UPDATED_AT: &str = "updated_at";

/// Upper bound for list page sizes.
pub const MAX_LIMIT: u64 = 1000;
pub const DEFAULT_LIMIT: u64 = 100;

pub struct CrudService<A: ConnectionAdapter> {
    adapter: Arc<A>,
    registry: &'static SchemaRegistry,
}

impl<A: ConnectionAdapter> Clone for CrudService<A> {
    fn clone(&self) -> Self {
        CrudService {
            adapter: Arc::clone(&self.adapter),
            registry: self.registry,
        }
    }
}

impl<A: ConnectionAdapter + 'static> CrudService<A> {
    pub fn new(adapter: Arc<A>, registry: &'static SchemaRegistry) -> Self {
        CrudService { adapter, registry }
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    pub fn registry(&self) -> &'static SchemaRegistry {
        self.registry
    }

    /// Each mutation gets its own manager, so concurrent requests never contend for one
    /// transaction slot.
    fn transactions(&self) -> TransactionManager<A> {
        TransactionManager::new(Arc::clone(&self.adapter))
    }

    fn db(&self) -> &dyn Executor {
        self.adapter.as_ref()
    }

    /// One page of rows plus the total number of matching rows.
    pub async fn list<M: Model>(
        &self,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<(Vec<Entity<M>>, u64), PersistError> {
        let mut options = options.clone();
        options.limit = Some(options.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT));
        let rows = Entity::<M>::find(self.registry, self.db(), filter, &options).await?;
        let total = Entity::<M>::count(self.registry, self.db(), filter, options.include_deleted).await?;
        Ok((rows, total))
    }

    pub async fn read<M: Model>(
        &self,
        id: Value,
        include_deleted: bool,
    ) -> Result<Option<Entity<M>>, PersistError> {
        Entity::<M>::find_by_id(self.registry, self.db(), id, include_deleted).await
    }

    pub async fn exists<M: Model>(&self, filter: &Filter) -> Result<bool, PersistError> {
        Entity::<M>::exists(self.registry, self.db(), filter, false).await
    }

    /// Insert a new row and return it as stored, database defaults included. The primary
    /// key is assigned by the database. Invalid attributes fail before a connection is taken.
    pub async fn create<M: Model>(&self, attributes: Row) -> Result<Entity<M>, PersistError> {
        let schema = self.registry.get_schema(M::ENTITY_TYPE);
        if let Some(pk) = schema.primary_key() {
            if attributes.contains_key(&pk.name) {
                let mut errors = ValidationErrors::new();
                errors.add(&pk.name, "is assigned by the database");
                return Err(PersistError::Validation(errors));
            }
        }
        entity::validate_insert(&schema, &attributes)?;
        let registry = self.registry;
        self.transactions()
            .with_transaction(move |tx| {
                Box::pin(async move {
                    let mut entity = Entity::<M>::new(registry, attributes);
                    entity.save(tx).await?;
                    entity.reload(tx).await?;
                    audit(registry, tx, &entity, "create").await?;
                    Ok(entity)
                })
            })
            .await
    }

    /// Apply `changes` to a live row. `None` when no such row exists (or it is soft-deleted).
    pub async fn update<M: Model>(
        &self,
        id: Value,
        changes: Row,
    ) -> Result<Option<Entity<M>>, PersistError> {
        let schema = self.registry.get_schema(M::ENTITY_TYPE);
        reject_managed_columns(&schema, &changes)?;
        entity::validate(&schema, &changes)?;
        let stamp = schema
            .column(UPDATED_AT)
            .is_some_and(|c| c.kind == ColumnKind::DateTime);
        let registry = self.registry;
        self.transactions()
            .with_transaction(move |tx| {
                Box::pin(async move {
                    let Some(mut entity) = Entity::<M>::find_by_id(registry, tx, id, false).await? else {
                        return Ok(None);
                    };
                    for (name, value) in changes {
                        entity.set(&name, value);
                    }
                    if stamp {
                        entity.set(UPDATED_AT, chrono::Utc::now());
                    }
                    entity.save(tx).await?;
                    audit(registry, tx, &entity, "update").await?;
                    Ok(Some(entity))
                })
            })
            .await
    }

    /// Soft or hard delete depending on the schema. `false` when no live row matched.
    pub async fn delete<M: Model>(&self, id: Value) -> Result<bool, PersistError> {
        let registry = self.registry;
        self.transactions()
            .with_transaction(move |tx| {
                Box::pin(async move {
                    let Some(mut entity) = Entity::<M>::find_by_id(registry, tx, id, false).await? else {
                        return Ok(false);
                    };
                    entity.delete(tx).await?;
                    audit(registry, tx, &entity, "delete").await?;
                    Ok(true)
                })
            })
            .await
    }

    /// Clear the soft-delete marker. Restoring a live row is a no-op and is not audited.
    pub async fn restore<M: Model>(&self, id: Value) -> Result<Option<Entity<M>>, PersistError> {
        let schema = self.registry.get_schema(M::ENTITY_TYPE);
        if !schema.has_soft_delete() {
            return Err(SchemaError::NoSoftDeleteColumn(M::ENTITY_TYPE.to_string()).into());
        }
        let registry = self.registry;
        self.transactions()
            .with_transaction(move |tx| {
                Box::pin(async move {
                    let Some(mut entity) = Entity::<M>::find_by_id(registry, tx, id, true).await? else {
                        return Ok(None);
                    };
                    if entity.is_soft_deleted() {
                        entity.restore(tx).await?;
                        audit(registry, tx, &entity, "restore").await?;
                    }
                    Ok(Some(entity))
                })
            })
            .await
    }
}

/// Key and soft-delete marker only change through create/delete/restore.
fn reject_managed_columns(schema: &Schema, changes: &Row) -> Result<(), PersistError> {
    let mut errors = ValidationErrors::new();
    if let Some(pk) = schema.primary_key() {
        if changes.contains_key(&pk.name) {
            errors.add(&pk.name, "cannot be changed");
        }
    }
    if let Some(sd) = schema.soft_delete_column() {
        if changes.contains_key(&sd.name) {
            errors.add(&sd.name, "is managed by delete and restore");
        }
    }
    errors.into_result()
}

async fn audit<M: Model>(
    registry: &SchemaRegistry,
    db: &dyn Executor,
    entity: &Entity<M>,
    action: &str,
) -> Result<(), PersistError> {
    let id = entity
        .id()
        .cloned()
        .ok_or_else(|| SchemaError::MissingPrimaryKeyValue(M::ENTITY_TYPE.to_string()))?;
    AuditLog::record(registry, db, M::ENTITY_TYPE, &id, action).await?;
    Ok(())
}
