//! Shared application state for all routes.

use crate::adapter::PgAdapter;
use crate::schema::SchemaRegistry;
use crate::service::CrudService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub adapter: Arc<PgAdapter>,
    pub service: CrudService<PgAdapter>,
}

impl AppState {
    pub fn new(adapter: PgAdapter, registry: &'static SchemaRegistry) -> Self {
        let adapter = Arc::new(adapter);
        AppState {
            service: CrudService::new(Arc::clone(&adapter), registry),
            adapter,
        }
    }
}
