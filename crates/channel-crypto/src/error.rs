//! Crypto error types

use channel_protocol::ProtocolError;
use thiserror::Error;

/// Cryptographic operation error
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Key too small: {bits} bits (min: {min})")]
    KeyTooSmall { bits: usize, min: usize },

    #[error("Key too large: {bits} bits (max: {max})")]
    KeyTooLarge { bits: usize, max: usize },

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Public key encoding failed: {0}")]
    KeyEncoding(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: bad padding, wrong key or corrupted envelope")]
    DecryptionFailed,

    #[error("Asymmetric decryption failed")]
    AsymmetricDecryptionFailed,

    #[error("Payload too large for RSA-OAEP: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Secret must not be empty")]
    EmptySecret,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
