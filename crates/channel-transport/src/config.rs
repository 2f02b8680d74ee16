//! Client configuration

use channel_crypto::{MAX_RSA_KEY_BITS, MIN_RSA_KEY_BITS};
use channel_protocol::{ProtocolError, PublicKeyFormat};
use serde::{Deserialize, Serialize};

use crate::{ChannelError, ChannelResult, DEFAULT_HANDSHAKE_ENDPOINT, DEFAULT_TIMEOUT_SECS};

/// Secure client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Endpoint answering handshakes
    pub handshake_endpoint: String,
    /// Format of the public keys we send
    pub key_format: PublicKeyFormat,
    /// RSA modulus size of ephemeral key pairs
    pub key_bits: usize,
    /// Request timeout applied by [`crate::ReqwestTransport`]
    pub timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            handshake_endpoint: DEFAULT_HANDSHAKE_ENDPOINT.to_string(),
            key_format: PublicKeyFormat::Xml,
            key_bits: channel_crypto::RSA_KEY_BITS,
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Default configuration talking to `handshake_endpoint`
    pub fn new(handshake_endpoint: impl Into<String>) -> Self {
        Self {
            handshake_endpoint: handshake_endpoint.into(),
            ..Self::default()
        }
    }

    /// Read overrides from `CHANNEL_*` environment variables
    pub fn from_env() -> ChannelResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides through `lookup`, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ChannelResult<Self> {
        let mut config = Self::default();

        if let Some(endpoint) = lookup("CHANNEL_HANDSHAKE_ENDPOINT") {
            config.handshake_endpoint = endpoint;
        }
        if let Some(format) = lookup("CHANNEL_KEY_FORMAT") {
            config.key_format = format
                .parse()
                .map_err(|e: ProtocolError| ChannelError::InvalidConfig(e.to_string()))?;
        }
        if let Some(bits) = lookup("CHANNEL_KEY_BITS") {
            config.key_bits = bits.trim().parse().map_err(|_| {
                ChannelError::InvalidConfig(format!("CHANNEL_KEY_BITS is not a number: {bits}"))
            })?;
        }
        if let Some(secs) = lookup("CHANNEL_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                ChannelError::InvalidConfig(format!("CHANNEL_TIMEOUT_SECS is not a number: {secs}"))
            })?;
            // 0 disables the timeout
            config.timeout_secs = (secs > 0).then_some(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ChannelResult<()> {
        if self.handshake_endpoint.trim().is_empty() {
            return Err(ChannelError::InvalidConfig(
                "handshake endpoint must not be empty".into(),
            ));
        }
        if self.key_bits < MIN_RSA_KEY_BITS {
            return Err(ChannelError::InvalidConfig(format!(
                "key_bits {} below minimum {}",
                self.key_bits, MIN_RSA_KEY_BITS
            )));
        }
        if self.key_bits > MAX_RSA_KEY_BITS {
            return Err(ChannelError::InvalidConfig(format!(
                "key_bits {} above maximum {}",
                self.key_bits, MAX_RSA_KEY_BITS
            )));
        }
        Ok(())
    }
}
