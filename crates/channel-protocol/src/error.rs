//! Error types for the protocol

use thiserror::Error;

/// Protocol error
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid body encoding: {0}")]
    InvalidBodyEncoding(#[from] base64::DecodeError),

    #[error("Malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("Unknown public key format: {0}")]
    UnknownKeyFormat(String),
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
