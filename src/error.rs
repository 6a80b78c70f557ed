//! # Error Handling
//!
//! This module defines the error types shared by the HTTP layer and the
//! session orchestrator, and how they're converted to HTTP responses.
//!
//! ## Error Categories:
//!
//! ### Service errors (HTTP-facing)
//! - **Internal / ConfigError**: server-side problems (500)
//! - **BadRequest / ValidationError**: the client sent invalid data (400)
//!
//! ### Orchestrator errors (session-facing)
//! - **Connection**: transport failed to open or re-open
//! - **FunctionDispatch**: unknown function name or invalid arguments
//! - **Persistence**: transcript/progress save failed (always non-fatal)
//! - **InvalidAnswer**: a screening answer outside the 0-3 scale
//!
//! ## Recovery policy:
//! None of the orchestrator errors end a conversation. Connection errors are
//! surfaced as notifications, dispatch errors become `{success: false}` tool
//! results, persistence errors are logged, and invalid answers feed the
//! attempt counter.

use actix_web::{HttpResponse, ResponseError};  // Web framework error handling
use serde_json::json;                          // For creating JSON error responses
use std::fmt;                                  // For implementing Display trait

/// Custom error types for the application.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::FunctionDispatch("unknown function".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Internal server errors
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// Configuration file or environment variable problems
    ConfigError(String),

    /// User input failed validation rules
    ValidationError(String),

    /// The realtime transport could not be opened or was lost
    Connection(String),

    /// A remotely invoked function could not be executed
    FunctionDispatch(String),

    /// A transcript or screening-progress write failed
    Persistence(String),

    /// A screening answer was outside the response scale
    InvalidAnswer(String),
}

impl AppError {
    /// Machine-readable error type used in JSON bodies and WebSocket frames.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::ConfigError(_) => "config_error",
            AppError::ValidationError(_) => "validation_error",
            AppError::Connection(_) => "connection_error",
            AppError::FunctionDispatch(_) => "function_dispatch_error",
            AppError::Persistence(_) => "persistence_error",
            AppError::InvalidAnswer(_) => "invalid_answer",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Internal(msg)
            | AppError::BadRequest(msg)
            | AppError::ConfigError(msg)
            | AppError::ValidationError(msg)
            | AppError::Connection(msg)
            | AppError::FunctionDispatch(msg)
            | AppError::Persistence(msg)
            | AppError::InvalidAnswer(msg) => msg,
        }
    }
}

/// Implementation of the Display trait for AppError.
///
/// ## Purpose:
/// Defines how errors are formatted as human-readable strings, both in logs
/// (`error = %err`) and in the `message` field of error responses.
impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Connection(msg) => write!(f, "Connection error: {}", msg),
            AppError::FunctionDispatch(msg) => write!(f, "Function dispatch error: {}", msg),
            AppError::Persistence(msg) => write!(f, "Persistence error: {}", msg),
            AppError::InvalidAnswer(msg) => write!(f, "Invalid answer: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Implementation of the ResponseError trait for AppError.
///
/// ## HTTP Status Code Mapping:
/// - Internal/ConfigError/Persistence → 500 (Internal Server Error)
/// - BadRequest/ValidationError/InvalidAnswer/FunctionDispatch → 400 (Bad Request)
/// - Connection → 503 (Service Unavailable)
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "validation_error",
///     "message": "Humor level must be between 0 and 100",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;

        match self {
            AppError::Internal(_) | AppError::ConfigError(_) | AppError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BadRequest(_)
            | AppError::ValidationError(_)
            | AppError::InvalidAnswer(_)
            | AppError::FunctionDispatch(_) => StatusCode::BAD_REQUEST,
            AppError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.code(),              // Machine-readable error type
                "message": self.message(),        // Human-readable error message
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Automatic conversion from anyhow::Error to AppError.
///
/// When you use `?` with an anyhow::Error inside a function returning
/// `AppResult`, it becomes an `AppError::Internal`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Automatic conversion from JSON parsing errors to AppError.
///
/// JSON errors almost always come from the client (HTTP body or WebSocket
/// frame), so they map to BadRequest rather than Internal.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

/// Automatic conversion from configuration errors to AppError.
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
///
/// ## Usage Example:
/// ```rust,ignore
/// fn record(&self, value: u8) -> AppResult<()> { ... }
/// ```
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Connection("lost".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::FunctionDispatch("unknown function".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_display_includes_category() {
        let err = AppError::Persistence("disk full".into());
        assert_eq!(err.to_string(), "Persistence error: disk full");
        assert_eq!(err.code(), "persistence_error");
    }

    #[test]
    fn test_json_error_is_bad_request() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: AppError = parse_err.into();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
