//! Application error types and HTTP response mapping.
//!
//! Defines `AppError` for every failure the core can report and implements
//! Axum's `IntoResponse` so handlers can return it directly.
//!
//! Error mappings:
//! - `Validation` → 400
//! - `Unauthorized` → 401
//! - `NotFound` → 404
//! - `Storage`, `Cache`, `Serialization`, `Internal` → 500
//!
//! Server-side failures are logged with their full context but answered with
//! a generic body, so driver messages never reach clients.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid secret provided")]
    Unauthorized,

    #[error("Storage error during {operation}: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("Cache error during {operation}: {source}")]
    Cache {
        operation: &'static str,
        #[source]
        source: redis::RedisError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wraps a storage failure with the operation that produced it.
    pub fn storage(operation: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
        move |source| AppError::Storage { operation, source }
    }

    /// Wraps a cache failure with the operation that produced it.
    pub fn cache(operation: &'static str) -> impl FnOnce(redis::RedisError) -> AppError {
        move |source| AppError::Cache { operation, source }
    }

    /// True for failures caused by the caller's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_) | AppError::NotFound(_) | AppError::Unauthorized
        )
    }

    /// Copy of this error for a second recipient, keeping its class.
    ///
    /// Driver errors are not `Clone`, so server-side variants collapse into
    /// `Internal` carrying the rendered message.
    pub fn replicate(&self) -> AppError {
        match self {
            AppError::Validation(msg) => AppError::Validation(msg.clone()),
            AppError::NotFound(msg) => AppError::NotFound(msg.clone()),
            AppError::Unauthorized => AppError::Unauthorized,
            other => AppError::Internal(other.to_string()),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage { .. }
            | AppError::Cache { .. }
            | AppError::Serialization(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Undecodable request bodies are reported like any other invalid input.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let error_message = if self.is_client_error() {
            self.to_string()
        } else {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replicate_keeps_client_classes() {
        let err = AppError::NotFound("query doesn't match any known words".into());
        assert!(matches!(err.replicate(), AppError::NotFound(msg) if msg == "query doesn't match any known words"));

        let err = AppError::Validation("bad".into());
        assert!(matches!(err.replicate(), AppError::Validation(_)));
    }

    #[test]
    fn replicate_collapses_server_errors_to_internal() {
        let err = AppError::storage("search commits")(sqlx::Error::PoolTimedOut);
        let copy = err.replicate();

        assert!(matches!(&copy, AppError::Internal(msg) if msg.contains("search commits")));
        assert!(!copy.is_client_error());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(AppError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
