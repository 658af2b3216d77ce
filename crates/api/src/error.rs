//! Handler errors and their JSON rendering.
//!
//! Every failure leaves the service as `{ "error": message, "code": CODE }`.
//! Server-side failures are logged here and reach the client only as a
//! generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use huggnote_core::error::CoreError;
use serde_json::json;

/// PostgreSQL `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed request body or path parameter.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A generation webhook whose signature does not match the shared
    /// secret, or that carries none.
    #[error("Webhook signature rejected")]
    BadSignature,
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Core(CoreError::NotFound { .. }) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Core(CoreError::Validation(_) | CoreError::SongOutOfRange(_)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            AppError::Core(CoreError::Conflict(_)) => (StatusCode::CONFLICT, "CONFLICT"),
            AppError::Core(CoreError::Corrupt { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CORRUPT_RECORD")
            }
            AppError::Database(sqlx::Error::RowNotFound) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Database(err) if is_duplicate_key(err) => {
                (StatusCode::CONFLICT, "DUPLICATE_ORDER")
            }
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::BadSignature => (StatusCode::UNAUTHORIZED, "BAD_SIGNATURE"),
        }
    }
}

/// Unique violations on a primary key or a `uq_*` constraint. For orders
/// this means the client reused an id.
fn is_duplicate_key(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };
    if db_err.code().as_deref() != Some(UNIQUE_VIOLATION) {
        return false;
    }
    db_err
        .constraint()
        .is_some_and(|c| c.starts_with("uq_") || c.ends_with("_pkey"))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, code, "Request failed");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        (status, axum::Json(json!({ "error": message, "code": code }))).into_response()
    }
}
