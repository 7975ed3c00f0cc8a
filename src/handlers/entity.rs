//! Entity CRUD handlers: list, read, create, update, delete, restore.

use crate::entity::{Entity, Model};
use crate::error::AppError;
use crate::response::{success_created, success_many, success_one};
use crate::schema::{ColumnKind, Schema};
use crate::service::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::sql::{Filter, FindOptions, OrderBy};
use crate::state::AppState;
use crate::value::{Row, Value};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::collections::HashMap;

/// Path ids must parse as the key type; anything else cannot name a row.
pub fn parse_id(schema: &Schema, raw: &str) -> Result<Value, AppError> {
    match Value::parse_for(ColumnKind::Primary, raw) {
        Value::Uuid(u) => Ok(Value::Uuid(u)),
        _ => Err(AppError::NotFound(format!("{} {}", schema.entity_type(), raw))),
    }
}

fn flag(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn count_param(key: &str, raw: &str) -> Result<u64, AppError> {
    raw.parse().map_err(|_| {
        AppError::BadRequest(format!("{} must be a non-negative integer, got '{}'", key, raw))
    })
}

/// Split list query parameters into paging options and column equality filters.
/// Keys that are neither options nor columns are ignored.
pub fn list_params(
    schema: &Schema,
    params: HashMap<String, String>,
) -> Result<(Filter, FindOptions), AppError> {
    let mut options = FindOptions::default();
    let mut desc = false;
    let mut order_by: Option<String> = None;
    let mut keys: Vec<(String, String)> = params.into_iter().collect();
    keys.sort();

    let mut filter = Filter::new();
    for (k, v) in keys {
        match k.as_str() {
            "limit" => options.limit = Some(count_param(&k, &v)?),
            "offset" => options.offset = Some(count_param(&k, &v)?),
            "include_deleted" => options.include_deleted = flag(&v),
            "desc" => desc = flag(&v),
            "order_by" => {
                if schema.column(&v).is_none() {
                    return Err(AppError::BadRequest(format!("cannot order by '{}'", v)));
                }
                order_by = Some(v);
            }
            _ => {
                if let Some(column) = schema.column(&k) {
                    let value = Value::parse_for(column.kind, &v);
                    if column.kind == ColumnKind::Primary && !matches!(value, Value::Uuid(_)) {
                        return Err(AppError::BadRequest(format!("invalid {} '{}'", k, v)));
                    }
                    filter.push(&k, value);
                }
            }
        }
    }
    options.order_by = order_by.map(|c| if desc { OrderBy::desc(&c) } else { OrderBy::asc(&c) });
    options.limit = Some(options.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT));
    Ok((filter, options))
}

/// JSON object to attributes, each value coerced by its column's kind. Unknown keys
/// are passed through for entity validation to report.
pub fn body_to_row(schema: &Schema, body: serde_json::Value) -> Result<Row, AppError> {
    let serde_json::Value::Object(map) = body else {
        return Err(AppError::BadRequest("body must be a JSON object".into()));
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let value = match schema.column(&k) {
                Some(c) => Value::from_json_for(c.kind, &v),
                None => Value::from_json(&v),
            };
            (k, value)
        })
        .collect())
}

fn not_found<M: Model>(id: &str) -> AppError {
    AppError::NotFound(format!("{} {}", M::ENTITY_TYPE, id))
}

pub async fn list<M: Model>(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let schema = state.service.registry().get_schema(M::ENTITY_TYPE);
    let (filter, options) = list_params(&schema, params)?;
    let (rows, total) = state.service.list::<M>(&filter, &options).await?;
    let data: Vec<serde_json::Value> = rows.iter().map(Entity::to_json).collect();
    Ok(success_many(
        data,
        total,
        options.limit.unwrap_or(DEFAULT_LIMIT),
        options.offset.unwrap_or(0),
    ))
}

pub async fn read<M: Model>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let schema = state.service.registry().get_schema(M::ENTITY_TYPE);
    let key = parse_id(&schema, &id)?;
    let include_deleted = params.get("include_deleted").is_some_and(|v| flag(v));
    let entity = state
        .service
        .read::<M>(key, include_deleted)
        .await?
        .ok_or_else(|| not_found::<M>(&id))?;
    Ok(success_one(entity.to_json()))
}

pub async fn create<M: Model>(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, AppError> {
    let schema = state.service.registry().get_schema(M::ENTITY_TYPE);
    let attributes = body_to_row(&schema, body)?;
    let entity = state.service.create::<M>(attributes).await?;
    Ok(success_created(entity.to_json()))
}

pub async fn update<M: Model>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, AppError> {
    let schema = state.service.registry().get_schema(M::ENTITY_TYPE);
    let key = parse_id(&schema, &id)?;
    let changes = body_to_row(&schema, body)?;
    let entity = state
        .service
        .update::<M>(key, changes)
        .await?
        .ok_or_else(|| not_found::<M>(&id))?;
    Ok(success_one(entity.to_json()))
}

pub async fn delete<M: Model>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let schema = state.service.registry().get_schema(M::ENTITY_TYPE);
    let key = parse_id(&schema, &id)?;
    if !state.service.delete::<M>(key).await? {
        return Err(not_found::<M>(&id));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn restore<M: Model>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let schema = state.service.registry().get_schema(M::ENTITY_TYPE);
    let key = parse_id(&schema, &id)?;
    let entity = state
        .service
        .restore::<M>(key)
        .await?
        .ok_or_else(|| not_found::<M>(&id))?;
    Ok(success_one(entity.to_json()))
}
