//! Error types for the outbox pipeline.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Outbox pipeline error variants.
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database error: {0}")]
    Db(#[from] vellum_db::DbError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Restricted destination: {0}")]
    RestrictedDestination(String),

    #[error("Webhook not found")]
    WebhookNotFound,

    #[error("Tenant not found")]
    TenantNotFound,

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// JSON error response returned by the pipeline's HTTP endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
}

impl IntoResponse for OutboxError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            OutboxError::Database(_) | OutboxError::Db(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
            }
            OutboxError::InvalidUrl(_) => (StatusCode::BAD_REQUEST, "invalid_url"),
            OutboxError::RestrictedDestination(_) => {
                (StatusCode::BAD_REQUEST, "restricted_destination")
            }
            OutboxError::WebhookNotFound => (StatusCode::NOT_FOUND, "webhook_not_found"),
            OutboxError::TenantNotFound => (StatusCode::NOT_FOUND, "tenant_not_found"),
            OutboxError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            OutboxError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, OutboxError>;
