//! Error types for favisend.

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
    // === Client Errors ===
    /// Requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A unique identity or share token is already taken.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// A referenced user, file or payment does not exist.
    #[error("Dangling reference: {0}")]
    DanglingReference(String),

    /// Payment status change outside the state machine.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Requested state.
        to: String,
    },

    // === Server Errors ===
    /// Backend could not be reached.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bug or unexpected condition.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client Errors
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateKey(_) | Self::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            Self::DanglingReference(_) => StatusCode::UNPROCESSABLE_ENTITY,

            // 5xx Server Errors
            Self::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Database(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::DuplicateKey(_) => "DUPLICATE_KEY",
            Self::DanglingReference(_) => "DANGLING_REFERENCE",
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::Database(_) => "DATABASE_ERROR",
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

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_statuses() {
        assert_eq!(
            AppError::NotFound("file".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::DuplicateKey("share_token".to_string()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::InvalidStateTransition {
                from: "completed".to_string(),
                to: "failed".to_string(),
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::DanglingReference("file".to_string()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert!(!AppError::Validation("rating".to_string()).is_server_error());
    }

    #[test]
    fn test_server_error_statuses() {
        let err = AppError::StorageUnavailable("connection refused".to_string());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_code(), "STORAGE_UNAVAILABLE");
        assert!(err.is_server_error());
        assert!(AppError::Database("boom".to_string()).is_server_error());
    }

    #[test]
    fn test_transition_message() {
        let err = AppError::InvalidStateTransition {
            from: "failed".to_string(),
            to: "completed".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid state transition: failed -> completed");
    }

    #[test]
    fn test_into_response_status() {
        let response = AppError::DuplicateKey("email".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
