//! Error types for the Dox backend
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// This enum represents all possible errors that can occur
/// in the application. It implements `IntoResponse` to
/// automatically convert errors to appropriate HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Unauthorized!")]
    Unauthorized,

    /// Magic link token unknown, consumed, or past its TTL (401)
    #[error("Invalid or expired magic link!")]
    InvalidOrExpiredLink,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource already exists (409)
    #[error("{0}")]
    Conflict(String),

    /// Rate limit exceeded (429)
    #[error("Please wait before requesting another magic link.")]
    RateLimited,

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Encryption/decryption error (500)
    ///
    /// Covers both a failed encryption during login (the login is
    /// aborted, nothing is persisted) and a GCM tag that does not
    /// verify on decryption.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Email delivery error (500)
    #[error("Failed to send magic link")]
    Delivery(String),

    /// Upstream HTTP error from an OAuth provider or GitHub (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body. Raw internal errors are never surfaced
    /// to the client.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string(), "not_found"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "unauthorized"),
            AppError::InvalidOrExpiredLink => {
                (StatusCode::UNAUTHORIZED, self.to_string(), "invalid_link")
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), "conflict"),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                self.to_string(),
                "rate_limited",
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                "database",
            ),
            AppError::Encryption(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Encryption error".to_string(),
                "encryption",
            ),
            AppError::Delivery(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                self.to_string(),
                "delivery",
            ),
            AppError::HttpClient(error) => {
                tracing::error!(%error, "Upstream request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream service error".to_string(),
                    "http_client",
                )
            }
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        };

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL
            .with_label_values(&[error_type, "unknown"])
            .inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
