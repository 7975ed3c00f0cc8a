//! Tenant CRUD: a schema-driven persistence core (registry, query builder, active-record
//! entities, transactions) and a small REST service for tenants and users on top of it.

pub mod adapter;
pub mod config;
pub mod entity;
pub mod error;
pub mod handlers;
pub mod migration;
pub mod models;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;
pub mod transaction;
pub mod value;

pub use adapter::{ConnectionAdapter, Executor, PgAdapter};
pub use config::Settings;
pub use entity::{Entity, EntityState, Model};
pub use error::{AppError, ConfigError, PersistError, SchemaError, ValidationErrors};
pub use migration::apply_migrations;
pub use models::register_all;
pub use routes::app;
pub use schema::{ColumnDescriptor, ColumnKind, Schema, SchemaRegistry};
pub use service::CrudService;
pub use state::AppState;
pub use transaction::{Transaction, TransactionManager};
pub use value::{Row, Value};
