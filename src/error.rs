//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing setting: {0}")]
    MissingSetting(&'static str),
    #[error("invalid setting {name}: '{value}'")]
    InvalidSetting { name: &'static str, value: String },
    #[error("catalog load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Failure of a single connection attempt.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("connect attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Failure to bind one entity on a connection. Recorded in the registration report, never surfaced.
#[derive(Error, Debug)]
pub enum BindError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Errors surfaced by `resolve`. Cloneable so every waiter of a shared establishment gets the same
/// value.
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    #[error("invalid tenant: {0}")]
    InvalidTenant(String),
    #[error("tenant {tenant_id}: connection failed after {attempts} attempts: {last_error}")]
    ConnectionExhausted {
        tenant_id: String,
        attempts: u32,
        #[source]
        last_error: Arc<ConnectError>,
    },
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

impl IntoResponse for ResolveError {
    fn into_response(self) -> Response {
        let (status, code, details) = match &self {
            ResolveError::InvalidTenant(_) => (StatusCode::BAD_REQUEST, "invalid_tenant", None),
            ResolveError::ConnectionExhausted { attempts, .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "tenant_unavailable",
                Some(serde_json::json!({ "attempts": attempts })),
            ),
        };
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
