//! Error types for livepoll.
//!
//! One unified error type for the whole service, with automatic conversion
//! from common error types using the `#[from]` attribute. Variants are
//! grouped into client errors (4xx) and server errors (5xx) and map
//! one-to-one onto HTTP status codes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors (4xx) ===
    /// Poll not found, or not visible to the caller.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication required or token invalid.
    #[error("Unauthorized")]
    Unauthorized,

    /// Write permission denied.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Invalid request (malformed id, inconsistent vote user, bad filter).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Validation failed with structured errors.
    #[error("Validation error: {0}")]
    ValidationErrors(#[from] validator::ValidationErrors),

    /// Validation failed with a message.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Illegal state-machine transition. Reserved: start/end are idempotent
    /// today, so nothing constructs this.
    #[error("Conflict: {0}")]
    Conflict(String),

    // === Server Errors (5xx) ===
    /// Storage operation failed or timed out.
    #[error("Database error: {0}")]
    Database(String),

    /// Upstream collaborator (group membership provider) failed.
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) | Self::ValidationErrors(_) | Self::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::ExternalService(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::ValidationErrors(_) | Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
