//! CrudService: transactional CRUD over registered entities, with audit logging.

mod crud;
pub use crud::{CrudService, DEFAULT_LIMIT, MAX_LIMIT};
