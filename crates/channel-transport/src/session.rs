//! Secure session state

use std::fmt;
use std::sync::Arc;

use channel_crypto::{Envelope, SymmetricKey};
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use zeroize::Zeroizing;

use crate::ChannelResult;

/// Outcome of a successful handshake
///
/// Immutable once built; a refresh produces a new value instead of
/// editing this one.
#[derive(Clone)]
pub struct SecureSession {
    secret: Zeroizing<String>,
    server_public_key: String,
    endpoint: String,
}

impl SecureSession {
    pub fn new(
        secret: impl Into<String>,
        server_public_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
            server_public_key: server_public_key.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Session before any handshake has completed
    pub fn unestablished(endpoint: impl Into<String>) -> Self {
        Self::new(String::new(), String::new(), endpoint)
    }

    /// Whether a handshake has produced a secret
    pub fn is_established(&self) -> bool {
        !self.secret.is_empty()
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn server_public_key(&self) -> &str {
        &self.server_public_key
    }

    /// Handshake endpoint this session was negotiated with
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Derive the request key from the secret
    pub fn symmetric_key(&self) -> SymmetricKey {
        SymmetricKey::derive(&self.secret)
    }

    /// Encrypt a body under the session key
    pub fn seal(&self, plaintext: &[u8]) -> ChannelResult<Envelope> {
        Ok(Envelope::seal(plaintext, &self.symmetric_key())?)
    }

    /// Decrypt a body encrypted under the session key
    pub fn open(&self, envelope: &Envelope) -> ChannelResult<Vec<u8>> {
        Ok(envelope.open(&self.symmetric_key())?)
    }
}

impl fmt::Debug for SecureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureSession")
            .field("established", &self.is_established())
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Copy-on-write cell holding the current [`SecureSession`]
///
/// Readers take an `Arc` snapshot and never observe a half-applied refresh.
/// Writers serialize on the refresh lock, build the next session off to
/// the side and swap it in with a single store.
pub struct SessionCell {
    current: RwLock<Arc<SecureSession>>,
    refresh: Mutex<()>,
}

impl SessionCell {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(Arc::new(SecureSession::unestablished(endpoint))),
            refresh: Mutex::new(()),
        }
    }

    /// Get a consistent view of the current session
    pub fn snapshot(&self) -> Arc<SecureSession> {
        self.current.read().clone()
    }

    /// Publish a new session
    pub fn replace(&self, session: Arc<SecureSession>) {
        *self.current.write() = session;
    }

    /// Wait for exclusive refresh rights
    pub async fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh.lock().await
    }

    pub fn is_established(&self) -> bool {
        self.current.read().is_established()
    }
}

impl fmt::Debug for SessionCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionCell").field(&self.snapshot()).finish()
    }
}
