//! Transport and channel error types

use channel_crypto::CryptoError;
use channel_protocol::ProtocolError;
use thiserror::Error;

/// Failure of the underlying HTTP exchange
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection timeout")]
    Timeout,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Receive error: {0}")]
    Receive(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Failure of a handshake or secure request
///
/// Every variant is terminal for the operation that raised it; nothing
/// here is retried internally.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Handshake response is missing the server public key header")]
    MissingServerKey,

    #[error("Handshake response could not be decrypted")]
    HandshakeDecryptionFailed,

    #[error("Handshake payload has no secret")]
    MissingSecret,

    #[error("Malformed handshake payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("Secure session not established")]
    SessionNotEstablished,

    #[error("Secure response could not be decrypted")]
    SecureResponseDecryptionFailed,

    #[error("Secure response is not valid UTF-8")]
    InvalidUtf8,

    #[error("Unexpected HTTP status: {0}")]
    UnexpectedStatus(u16),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

pub type ChannelResult<T> = Result<T, ChannelError>;
