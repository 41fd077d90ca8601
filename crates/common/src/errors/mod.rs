//! Error types for Polaris service calls
//!
//! Provides:
//! - Distinct error types for different failure modes
//! - Mapping from HTTP status codes returned by the proposal tool
//! - Error codes for client handling

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    InvalidFormat,
    PayloadTooLarge,

    // Authentication errors (2xxx)
    Unauthorized,

    // Resource errors (4xxx)
    NotFound,

    // External service errors (8xxx)
    UpstreamError,
    TransportError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::InvalidFormat => 1003,
            ErrorCode::PayloadTooLarge => 1004,

            ErrorCode::Unauthorized => 2001,

            ErrorCode::NotFound => 4001,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::TransportError => 8002,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Errors raised while talking to the proposal tool services
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::HttpClient(_) => ErrorCode::TransportError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Build an error from a non-success HTTP status and its response body
    pub fn from_status(status: u16, resource_type: &str, id: &str, body: String) -> Self {
        match status {
            401 | 403 => AppError::Unauthorized { message: body },
            404 => AppError::NotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            },
            _ => AppError::Upstream {
                status,
                message: body,
            },
        }
    }

    /// Whether the failure came from the remote service rather than this process
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            AppError::Unauthorized { .. }
                | AppError::NotFound { .. }
                | AppError::Upstream { .. }
                | AppError::HttpClient(_)
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
