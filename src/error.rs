use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Main error type for the picket rate limiting service
#[derive(Debug)]
pub enum PicketError {
    /// Configuration or CLI argument errors
    Config(String),

    /// Caller-supplied input that cannot be parsed or is missing
    Validation(String),

    /// Backing bucket store failures
    Storage(String),

    /// Serialization failures on the snapshot path
    Encoding(String),

    /// Binary wire codec failures
    Codec(CodecError),

    /// Replication transport errors
    Transport(String),

    /// System I/O errors
    Io(std::io::Error),
}

/// Failures of the fixed-layout bucket wire codec
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecError {
    /// Bucket name longer than the u16 length prefix can describe
    NameTooLarge,

    /// Input ended before the fixed header or the declared name bytes
    ShortBuffer,
}

impl fmt::Display for PicketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PicketError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PicketError::Validation(msg) => write!(f, "Validation error: {}", msg),
            PicketError::Storage(msg) => write!(f, "Storage error: {}", msg),
            PicketError::Encoding(msg) => write!(f, "Encoding error: {}", msg),
            PicketError::Codec(err) => write!(f, "Codec error: {}", err),
            PicketError::Transport(msg) => write!(f, "Transport error: {}", msg),
            PicketError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::NameTooLarge => {
                write!(f, "bucket name larger than {} bytes", u16::MAX)
            }
            CodecError::ShortBuffer => write!(f, "short buffer"),
        }
    }
}

impl std::error::Error for PicketError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PicketError::Io(err) => Some(err),
            PicketError::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl std::error::Error for CodecError {}

// Convenient type alias for Results using our error type
pub type Result<T> = std::result::Result<T, PicketError>;

// Axum IntoResponse implementation for HTTP error responses
impl IntoResponse for PicketError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        let error_response = json!({
            "error": {
                "code": status_code.as_u16(),
                "message": self.to_string(),
                "type": self.error_type(),
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

impl PicketError {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            PicketError::Config(_) => StatusCode::BAD_REQUEST,
            PicketError::Validation(_) => StatusCode::BAD_REQUEST,
            PicketError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PicketError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PicketError::Codec(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PicketError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PicketError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            PicketError::Config(_) => "configuration_error",
            PicketError::Validation(_) => "validation_error",
            PicketError::Storage(_) => "storage_error",
            PicketError::Encoding(_) => "encoding_error",
            PicketError::Codec(_) => "codec_error",
            PicketError::Transport(_) => "transport_error",
            PicketError::Io(_) => "io_error",
        }
    }
}

// Conversions from common error types
impl From<std::io::Error> for PicketError {
    fn from(err: std::io::Error) -> Self {
        PicketError::Io(err)
    }
}

impl From<serde_json::Error> for PicketError {
    fn from(err: serde_json::Error) -> Self {
        PicketError::Encoding(err.to_string())
    }
}

impl From<CodecError> for PicketError {
    fn from(err: CodecError) -> Self {
        PicketError::Codec(err)
    }
}
