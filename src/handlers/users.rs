//! User-specific handlers. Users must belong to an existing tenant.

use crate::entity::Model;
use crate::error::{AppError, PersistError, ValidationErrors};
use crate::handlers::entity::body_to_row;
use crate::models::{Tenant, User};
use crate::response::success_created;
use crate::sql::Filter;
use crate::state::AppState;
use crate::value::Value;
use axum::{extract::State, response::IntoResponse, Json};

fn unknown_tenant(message: &str) -> AppError {
    let mut errors = ValidationErrors::new();
    errors.add("tenant_id", message);
    PersistError::Validation(errors).into()
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, AppError> {
    let schema = state.service.registry().get_schema(User::ENTITY_TYPE);
    let attributes = body_to_row(&schema, body)?;
    if let Some(raw) = attributes.get("tenant_id").and_then(Value::as_str) {
        let tenant = uuid::Uuid::parse_str(raw).map_err(|_| unknown_tenant("must be a tenant id"))?;
        if !state.service.exists::<Tenant>(&Filter::new().eq("id", tenant)).await? {
            return Err(unknown_tenant("no such tenant"));
        }
    }
    let user = state.service.create::<User>(attributes).await?;
    Ok(success_created(user.to_json()))
}
