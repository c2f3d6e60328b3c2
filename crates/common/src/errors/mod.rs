//! Error types for QueryForge services
//!
//! Two layers:
//! - `QueryError`: failures of a single natural-language query call. These never
//!   leave the orchestrator as errors; they are rendered into the result string.
//! - `AppError`: service-level failures (request validation, startup, configuration)
//!   with HTTP status mapping and structured error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for the query pipeline
pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Failures of one translate-and-run call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Transport or model-side failure while generating the query
    #[error("{message}")]
    Model { message: String },

    /// Neither the strict nor the permissive parser accepted the text
    #[error(
        "Failed to parse query from model. Expected valid JSON or a literal mapping. \
         Raw content received: '{raw}'. Errors: JSON ({json_error}), literal ({literal_error})"
    )]
    Parse {
        json_error: String,
        literal_error: String,
        raw: String,
    },

    /// Parsing succeeded but did not produce a mapping
    #[error("Failed to parse query from model: expected a mapping, but got {actual}. Raw content: '{raw}'")]
    TypeMismatch { actual: String, raw: String },

    #[error("Aggregation pipeline is empty.")]
    EmptyPipeline,

    /// Store-side failure, including query documents the store cannot accept
    #[error("{message}")]
    Execution { message: String },

    #[error("Document nesting exceeds the maximum depth of {limit}")]
    DepthLimitExceeded { limit: usize },
}

impl QueryError {
    /// Stable machine-readable kind, used for metrics labels and logs
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::Model { .. } => "model_error",
            QueryError::Parse { .. } => "parse_error",
            QueryError::TypeMismatch { .. } => "type_mismatch",
            QueryError::EmptyPipeline => "empty_pipeline",
            QueryError::Execution { .. } => "execution_error",
            QueryError::DepthLimitExceeded { .. } => "depth_limit_exceeded",
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        QueryError::Execution {
            message: message.into(),
        }
    }

    pub fn model(message: impl Into<String>) -> Self {
        QueryError::Model {
            message: message.into(),
        }
    }
}

impl From<mongodb::error::Error> for QueryError {
    fn from(err: mongodb::error::Error) -> Self {
        QueryError::Execution {
            message: err.to_string(),
        }
    }
}

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    PayloadTooLarge,

    // Rate limiting (6xxx)
    RateLimited,

    // Database errors (7xxx)
    ConnectionError,

    // External service errors (8xxx)
    ModelError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::PayloadTooLarge => 1004,
            ErrorCode::RateLimited => 6001,
            ErrorCode::ConnectionError => 7002,
            ErrorCode::ModelError => 8002,
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Payload too large: {size} characters exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Model client error: {message}")]
    ModelClient { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::ModelClient { .. } => ErrorCode::ModelError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            AppError::ModelClient { .. } => StatusCode::BAD_GATEWAY,

            AppError::DatabaseConnection { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pipeline_message() {
        assert_eq!(
            QueryError::EmptyPipeline.to_string(),
            "Aggregation pipeline is empty."
        );
    }

    #[test]
    fn test_parse_error_keeps_raw_text_and_diagnostics() {
        let err = QueryError::Parse {
            json_error: "expected value at line 1 column 1".into(),
            literal_error: "unexpected character '<' (line 1, column 1)".into(),
            raw: "<not a query>".into(),
        };
        let message = err.to_string();
        assert!(message.contains("'<not a query>'"));
        assert!(message.contains("expected value at line 1 column 1"));
        assert!(message.contains("unexpected character '<'"));
        assert_eq!(err.kind(), "parse_error");
    }

    #[test]
    fn test_model_error_is_unmodified() {
        let err = QueryError::model("429 Too Many Requests: quota exhausted");
        assert_eq!(err.to_string(), "429 Too Many Requests: quota exhausted");
        assert_eq!(err.kind(), "model_error");
    }

    #[test]
    fn test_execution_error_is_unmodified() {
        let err = QueryError::execution("Unrecognized pipeline stage name: '$bogus'");
        assert_eq!(err.to_string(), "Unrecognized pipeline stage name: '$bogus'");
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "prompt must not be empty".into(),
            field: Some("prompt".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_server_error() {
        let err = AppError::DatabaseConnection {
            message: "server selection timeout".into(),
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code().as_code(), 7002);
        assert!(err.is_server_error());
    }
}
