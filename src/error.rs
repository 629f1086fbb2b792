//! Error types for Tradepost
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// Domain errors (validation, state conflicts, not-found) are typed so
/// callers and tests can match on them; infrastructure errors wrap their
/// source. All variants map to an HTTP response via `IntoResponse`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Access denied (403)
    #[error("Access denied")]
    Forbidden,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A moderation reason was required but missing or blank (400)
    #[error("A reason is required")]
    MissingReason,

    /// Product placement invariant violated: (category + item) XOR kit (400)
    #[error("Invalid placement: {0}")]
    InvalidPlacement(String),

    /// Product pricing invariant violated (400)
    #[error("Invalid pricing: {0}")]
    InvalidPricing(String),

    /// Operation not valid in the entity's current state (409)
    ///
    /// Covers already-approved, already-rejected, already-blacklisted and
    /// not-blacklisted guards. Conditional writes that affect zero rows
    /// after an existence check surface as this variant.
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// One-time code missing, consumed, or expired (400)
    #[error("Code is invalid or expired")]
    InvalidOrExpired,

    /// Unique-credential generation ran out of retries (500)
    #[error("Credential generation exhausted retries")]
    ExhaustedRetries,

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Object storage error (500)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// HMAC/signing or password-hashing error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

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
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string(), "not_found"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "unauthorized"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, self.to_string(), "forbidden"),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::MissingReason => {
                (StatusCode::BAD_REQUEST, self.to_string(), "missing_reason")
            }
            AppError::InvalidPlacement(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone(), "invalid_placement")
            }
            AppError::InvalidPricing(msg) => {
                (StatusCode::BAD_REQUEST, msg.clone(), "invalid_pricing")
            }
            AppError::StateConflict(msg) => (StatusCode::CONFLICT, msg.clone(), "state_conflict"),
            AppError::InvalidOrExpired => (
                StatusCode::BAD_REQUEST,
                self.to_string(),
                "invalid_or_expired",
            ),
            AppError::ExhaustedRetries => (
                StatusCode::INTERNAL_SERVER_ERROR,
                self.to_string(),
                "exhausted_retries",
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                "database",
            ),
            AppError::Storage(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "storage"),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Encryption(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "encryption")
            }
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
