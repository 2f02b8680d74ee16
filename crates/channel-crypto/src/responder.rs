//! Server side of the channel: answers handshakes and secure requests

use std::fmt;

use channel_protocol::{HandshakePayload, PublicKeyFormat, encode_body};
use rand::{RngCore, rngs::OsRng};
use tracing::debug;
use zeroize::Zeroizing;

use crate::{CryptoError, CryptoResult, Envelope, KeyPair, PublicKey, SymmetricKey};

/// Holds the server key pair and the secret handed out by handshakes
pub struct ChannelResponder {
    keypair: KeyPair,
    public_key_text: String,
    secret: Zeroizing<String>,
}

impl ChannelResponder {
    /// Create a responder with a fresh 2048-bit server key pair
    pub fn new(secret: impl Into<String>, key_format: PublicKeyFormat) -> CryptoResult<Self> {
        Self::with_keypair(KeyPair::generate()?, secret, key_format)
    }

    /// Create a responder around an existing server key pair
    pub fn with_keypair(
        keypair: KeyPair,
        secret: impl Into<String>,
        key_format: PublicKeyFormat,
    ) -> CryptoResult<Self> {
        let secret = Zeroizing::new(secret.into());
        if secret.is_empty() {
            return Err(CryptoError::EmptySecret);
        }

        let public_key_text = keypair.encode_public_key(key_format)?;

        Ok(Self {
            keypair,
            public_key_text,
            secret,
        })
    }

    /// Draw a random 256-bit secret, base64 encoded
    pub fn generate_secret() -> String {
        let mut bytes = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut bytes[..]);
        encode_body(&bytes[..])
    }

    /// Value for the server key response header
    pub fn server_public_key(&self) -> &str {
        &self.public_key_text
    }

    /// Encrypt `{"secret": ...}` to the client key of a handshake request
    pub fn answer_handshake(&self, client_public_key: &str) -> CryptoResult<String> {
        let client_key = PublicKey::decode(client_public_key)?;
        let payload = Zeroizing::new(
            HandshakePayload::new(self.secret.as_str())
                .to_json()
                .map_err(|e| CryptoError::Encryption(e.to_string()))?,
        );

        let ciphertext = client_key.encrypt(&payload)?;
        debug!(client_key_bits = client_key.bits(), "Answered handshake");

        Ok(encode_body(&ciphertext))
    }

    /// Decrypt the envelope body of a secure request
    pub fn open_request(&self, body: &str) -> CryptoResult<Vec<u8>> {
        let envelope = Envelope::from_body(body)?;
        envelope.open(&SymmetricKey::derive(&self.secret))
    }

    /// Encrypt a response to the per-request client key
    pub fn seal_response(&self, client_public_key: &str, plaintext: &[u8]) -> CryptoResult<String> {
        let client_key = PublicKey::decode(client_public_key)?;
        Ok(encode_body(&client_key.encrypt(plaintext)?))
    }
}

impl fmt::Debug for ChannelResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelResponder")
            .field("keypair", &self.keypair)
            .finish_non_exhaustive()
    }
}
