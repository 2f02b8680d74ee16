//! Handshake payload carried inside the encrypted handshake response

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Decrypted body of a handshake response: `{ "secret": "<string>" }`
///
/// `secret` is optional at the serde level so that an absent field and an
/// explicit `null` both deserialize; [`HandshakePayload::into_secret`]
/// is the only way to read it and it rejects both, along with `""`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakePayload {
    #[serde(default)]
    secret: Option<String>,
}

impl HandshakePayload {
    /// Build a payload announcing `secret`
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
        }
    }

    /// Serialize to JSON bytes
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    ///
    /// The document must be an object; the sequence form serde would
    /// otherwise accept for a struct is rejected.
    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        let object: Map<String, Value> = serde_json::from_slice(data)?;
        serde_json::from_value(Value::Object(object))
    }

    /// Take the secret, if it is present and non-empty
    pub fn into_secret(self) -> Option<String> {
        self.secret.filter(|s| !s.is_empty())
    }
}
