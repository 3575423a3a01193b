//! Application error type shared by every layer.
//!
//! Background jobs use [`AppError::is_retryable`] to decide between a retry with
//! backoff and an immediate failure. HTTP handlers convert errors into JSON
//! responses via [`IntoResponse`]; internal details never reach the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};

/// Name of the unique index guarding short codes.
pub const CODE_CONSTRAINT: &str = "short_links_code_key";

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorInfo {
    pub code: &'static str,
    pub message: String,
    pub details: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String, details: Value },

    #[error("{message}")]
    NotFound { message: String, details: Value },

    /// The durable store rejected a duplicate short code.
    #[error("{message}")]
    Conflict { message: String, details: Value },

    /// Durable store or other infrastructure failure.
    #[error("{message}")]
    Internal { message: String, details: Value },

    /// Every generation attempt collided. Signals an undersized alphabet or
    /// code length rather than a transient condition.
    #[error("{message}")]
    SlugExhausted { message: String, details: Value },

    #[error("{message}")]
    QueueUnavailable { message: String, details: Value },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }

    pub fn not_found(message: impl Into<String>, details: Value) -> Self {
        Self::NotFound {
            message: message.into(),
            details,
        }
    }

    pub fn conflict(message: impl Into<String>, details: Value) -> Self {
        Self::Conflict {
            message: message.into(),
            details,
        }
    }

    pub fn internal(message: impl Into<String>, details: Value) -> Self {
        Self::Internal {
            message: message.into(),
            details,
        }
    }

    pub fn slug_exhausted(message: impl Into<String>, details: Value) -> Self {
        Self::SlugExhausted {
            message: message.into(),
            details,
        }
    }

    pub fn queue_unavailable(message: impl Into<String>, details: Value) -> Self {
        Self::QueueUnavailable {
            message: message.into(),
            details,
        }
    }

    /// Whether a background job failing with this error should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Internal { .. } | Self::Conflict { .. } | Self::QueueUnavailable { .. }
        )
    }

    /// Short machine-readable identifier, used in logs and response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Internal { .. } => "internal_error",
            Self::SlugExhausted { .. } => "slug_exhausted",
            Self::QueueUnavailable { .. } => "queue_unavailable",
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Internal { .. } | Self::SlugExhausted { .. } | Self::QueueUnavailable { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing view of the error. Server-side failures lose their
    /// message and details.
    pub fn info(&self) -> ErrorInfo {
        let (message, details) = match self {
            Self::Validation { message, details }
            | Self::NotFound { message, details }
            | Self::Conflict { message, details } => (message.clone(), details.clone()),
            Self::Internal { .. } | Self::SlugExhausted { .. } | Self::QueueUnavailable { .. } => {
                ("Internal server error".to_string(), json!({}))
            }
        };
        ErrorInfo {
            code: self.kind(),
            message,
            details,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.info() };
        (self.status(), Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        let fields: Vec<String> = e.errors().keys().map(|k| k.to_string()).collect();
        AppError::bad_request(
            "Request validation failed",
            json!({ "fields": fields, "reason": e.to_string() }),
        )
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db) = e.as_database_error()
            && db.is_unique_violation()
            && db.constraint() == Some(CODE_CONSTRAINT)
        {
            return AppError::conflict(
                "Short code already exists",
                json!({ "constraint": CODE_CONSTRAINT }),
            );
        }

        tracing::error!("Database error: {}", e);
        AppError::internal("Database error", json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::internal("db down", json!({})).is_retryable());
        assert!(AppError::conflict("dup", json!({})).is_retryable());
        assert!(AppError::queue_unavailable("closed", json!({})).is_retryable());

        assert!(!AppError::not_found("gone", json!({})).is_retryable());
        assert!(!AppError::bad_request("bad", json!({})).is_retryable());
        assert!(!AppError::slug_exhausted("exhausted", json!({})).is_retryable());
    }

    #[test]
    fn test_display_uses_message() {
        let err = AppError::not_found("Short link not found", json!({ "code": "abc" }));
        assert_eq!(err.to_string(), "Short link not found");
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_internal_response_hides_details() {
        let response =
            AppError::internal("pool timed out", json!({ "host": "db-1" })).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_not_found_response_status() {
        let response = AppError::not_found("missing", json!({})).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_row_not_found_maps_to_internal() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::Internal { .. }));
    }
}
