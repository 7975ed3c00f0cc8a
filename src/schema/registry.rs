//! Process-wide store of entity schemas.

use crate::error::SchemaError;
use crate::schema::{ColumnDescriptor, ColumnKind, ColumnOptions, Schema};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// How a registration for an already-registered column name with a different
/// definition is handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationPolicy {
    /// Replace the earlier descriptor in place (keeps its position).
    LastWriteWins,
    /// Reject with `SchemaError::ConflictingColumn`.
    Strict,
}

static GLOBAL: OnceLock<SchemaRegistry> = OnceLock::new();

/// Entity type -> schema snapshot. Populated during startup; reads afterwards only clone an `Arc`.
pub struct SchemaRegistry {
    policy: RegistrationPolicy,
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::with_policy(RegistrationPolicy::LastWriteWins)
    }

    pub fn strict() -> Self {
        Self::with_policy(RegistrationPolicy::Strict)
    }

    pub fn with_policy(policy: RegistrationPolicy) -> Self {
        SchemaRegistry {
            policy,
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide registry (last-write-wins policy).
    pub fn global() -> &'static SchemaRegistry {
        GLOBAL.get_or_init(SchemaRegistry::new)
    }

    pub fn policy(&self) -> RegistrationPolicy {
        self.policy
    }

    /// Cached schema for `entity_type`; an empty one is created and cached on first access.
    pub fn get_schema(&self, entity_type: &str) -> Arc<Schema> {
        if let Some(s) = self
            .schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_type)
        {
            return Arc::clone(s);
        }
        let mut schemas = self.schemas.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            schemas
                .entry(entity_type.to_string())
                .or_insert_with(|| Arc::new(Schema::empty(entity_type))),
        )
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(entity_type)
    }

    /// Registered entity types, sorted.
    pub fn entity_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    /// Add or replace one column descriptor.
    pub fn register_column(
        &self,
        entity_type: &str,
        name: &str,
        kind: ColumnKind,
        options: ColumnOptions,
    ) -> Result<Arc<Schema>, SchemaError> {
        self.update(entity_type, None, vec![ColumnDescriptor::new(name, kind, options)])
    }

    /// Register a whole schema: table name plus ordered columns. Either every column
    /// is applied or none is.
    pub fn register(
        &self,
        entity_type: &str,
        table: &str,
        columns: impl IntoIterator<Item = ColumnDescriptor>,
    ) -> Result<Arc<Schema>, SchemaError> {
        self.update(entity_type, Some(table), columns.into_iter().collect())
    }

    fn update(
        &self,
        entity_type: &str,
        table: Option<&str>,
        columns: Vec<ColumnDescriptor>,
    ) -> Result<Arc<Schema>, SchemaError> {
        let mut schemas = self.schemas.write().unwrap_or_else(PoisonError::into_inner);
        let current = schemas
            .get(entity_type)
            .map(|s| (**s).clone())
            .unwrap_or_else(|| Schema::empty(entity_type));
        let mut next = match table {
            Some(t) => current.with_table(t),
            None => current,
        };
        for column in columns {
            apply_column(&mut next, column, self.policy)?;
        }
        tracing::debug!(
            entity = entity_type,
            table = next.table(),
            columns = next.columns().len(),
            "schema registered"
        );
        let next = Arc::new(next);
        schemas.insert(entity_type.to_string(), Arc::clone(&next));
        Ok(next)
    }
}

fn apply_column(
    schema: &mut Schema,
    column: ColumnDescriptor,
    policy: RegistrationPolicy,
) -> Result<(), SchemaError> {
    let entity = schema.entity_type().to_string();

    if column.kind == ColumnKind::SoftDeleteTimestamp && !column.nullable {
        return Err(SchemaError::NullableSoftDelete {
            entity,
            column: column.name,
        });
    }
    for unique_kind in [ColumnKind::Primary, ColumnKind::SoftDeleteTimestamp] {
        if column.kind != unique_kind {
            continue;
        }
        let clash = schema
            .columns()
            .iter()
            .find(|c| c.kind == unique_kind && c.name != column.name);
        if let Some(existing) = clash {
            let existing = existing.name.clone();
            return Err(match unique_kind {
                ColumnKind::Primary => SchemaError::DuplicatePrimaryKey {
                    entity,
                    existing,
                    column: column.name,
                },
                _ => SchemaError::DuplicateSoftDeleteColumn {
                    entity,
                    existing,
                    column: column.name,
                },
            });
        }
    }

    let columns = schema.columns_mut();
    match columns.iter_mut().find(|c| c.name == column.name) {
        Some(existing) if *existing == column => {}
        Some(existing) => {
            if policy == RegistrationPolicy::Strict {
                return Err(SchemaError::ConflictingColumn {
                    entity,
                    column: column.name,
                });
            }
            tracing::warn!(
                entity = %entity,
                column = %column.name,
                old = ?existing.kind,
                new = ?column.kind,
                "column re-registered with a different definition; last registration wins"
            );
            *existing = column;
        }
        None => columns.push(column),
    }
    Ok(())
}
