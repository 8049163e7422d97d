//! Error types for the protocol crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol error type covering encoding failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Failed to serialize data.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize data.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

/// Client-facing error category.
///
/// Core errors are collapsed into one of these before they leave the
/// process. Detail stays in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request was malformed or tried to leave the root directory.
    BadRequest,
    /// Nothing exists at the requested path.
    NotFound,
    /// A fault inside the server.
    Internal,
}

impl ErrorCode {
    /// HTTP status code the web layer should answer with.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::BadRequest => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::Internal => 500,
        }
    }

    /// Whether the failure was caused by client input.
    pub fn is_client_error(self) -> bool {
        !matches!(self, ErrorCode::Internal)
    }

    /// Generic message for this category.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "bad request",
            ErrorCode::NotFound => "not found",
            ErrorCode::Internal => "internal error",
        }
    }
}

/// Error body returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error category.
    pub code: ErrorCode,
    /// Short message, free of filesystem paths.
    pub message: String,
}

impl ErrorResponse {
    /// Create a response with the category's generic message.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
        }
    }

    /// Create a response with a custom message.
    ///
    /// Callers must not include server-side paths in `message`.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for a bad request.
    pub fn bad_request() -> Self {
        Self::new(ErrorCode::BadRequest)
    }

    /// Shorthand for not found.
    pub fn not_found() -> Self {
        Self::new(ErrorCode::NotFound)
    }

    /// Shorthand for an internal error.
    pub fn internal() -> Self {
        Self::new(ErrorCode::Internal)
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code.http_status())
    }
}
