//! Application entities.

mod audit_log;
mod tenant;
mod user;

pub use audit_log::AuditLog;
pub use tenant::Tenant;
pub use user::User;

use crate::entity::Model;
use crate::error::SchemaError;
use crate::schema::SchemaRegistry;

/// Register every application entity. Run once at startup, before serving requests.
pub fn register_all(registry: &SchemaRegistry) -> Result<(), SchemaError> {
    Tenant::register(registry)?;
    User::register(registry)?;
    AuditLog::register(registry)?;
    Ok(())
}
