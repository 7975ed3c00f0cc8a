//! Versioned entity routes under `/api/v1`.

use crate::handlers::{create, create_user, delete, list, read, restore, update};
use crate::models::{AuditLog, Tenant, User};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/tenants", get(list::<Tenant>).post(create::<Tenant>))
        .route(
            "/tenants/:id",
            get(read::<Tenant>).patch(update::<Tenant>).delete(delete::<Tenant>),
        )
        .route("/users", get(list::<User>).post(create_user))
        .route(
            "/users/:id",
            get(read::<User>).patch(update::<User>).delete(delete::<User>),
        )
        .route("/users/:id/restore", post(restore::<User>))
        .route("/audit_logs", get(list::<AuditLog>))
        .with_state(state)
}
