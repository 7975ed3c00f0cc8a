//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Schema-level misuse, detected locally before any I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("entity '{0}' has no primary key column")]
    MissingPrimaryKey(String),
    #[error("entity '{0}' has no primary key value (not persisted)")]
    MissingPrimaryKeyValue(String),
    #[error("entity '{0}' has no soft-delete column")]
    NoSoftDeleteColumn(String),
    #[error("entity '{entity}' already has primary key '{existing}', cannot add '{column}'")]
    DuplicatePrimaryKey { entity: String, existing: String, column: String },
    #[error("entity '{entity}' already has soft-delete column '{existing}', cannot add '{column}'")]
    DuplicateSoftDeleteColumn { entity: String, existing: String, column: String },
    #[error("soft-delete column '{column}' on entity '{entity}' must be nullable")]
    NullableSoftDelete { entity: String, column: String },
    #[error("column '{column}' on entity '{entity}' is already registered with a different definition")]
    ConflictingColumn { entity: String, column: String },
}

/// Field name -> messages, in the order fields were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(IndexMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), PersistError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(PersistError::Validation(self))
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, msgs)| format!("{}: {}", field, msgs.join(", ")))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Errors raised by the persistence core.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("schema: {0}")]
    Schema(#[from] SchemaError),
    #[error("validation: {0}")]
    Validation(ValidationErrors),
    /// Adapter errors, passed through unchanged.
    #[error(transparent)]
    Persistence(#[from] sqlx::Error),
    #[error("transaction state: {0}")]
    TransactionState(String),
    #[error("{entity} is {state}; no further operations allowed")]
    InvalidState { entity: String, state: &'static str },
    #[error("{original} (rollback also failed: {rollback})")]
    RollbackFailed {
        original: Box<PersistError>,
        rollback: Box<PersistError>,
    },
}

impl PersistError {
    /// The error that caused a failed transaction, looking through a failed rollback.
    pub fn root(&self) -> &PersistError {
        match self {
            PersistError::RollbackFailed { original, .. } => original.root(),
            other => other,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl From<SchemaError> for AppError {
    fn from(e: SchemaError) -> Self {
        AppError::Persist(e.into())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Persist(e.into())
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

fn persist_status(e: &PersistError) -> (StatusCode, &'static str) {
    match e.root() {
        PersistError::Schema(_) => (StatusCode::INTERNAL_SERVER_ERROR, "schema_error"),
        PersistError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
        PersistError::TransactionState(_) => (StatusCode::CONFLICT, "transaction_state"),
        PersistError::InvalidState { .. } => (StatusCode::GONE, "gone"),
        PersistError::Persistence(sqlx::Error::RowNotFound) => (StatusCode::NOT_FOUND, "not_found"),
        PersistError::Persistence(sqlx::Error::Database(db)) if db.code().as_deref() == Some("23505") => {
            (StatusCode::CONFLICT, "conflict")
        }
        PersistError::Persistence(_) | PersistError::RollbackFailed { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Persist(e) => persist_status(e),
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        };
        let details = match &self {
            AppError::Persist(e) => match e.root() {
                PersistError::Validation(errors) => serde_json::to_value(errors).ok(),
                _ => None,
            },
            _ => None,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}
