//! Channel Transport - secure requests over a plain HTTP transport
//!
//! Runs the client side of the channel: the handshake that establishes a
//! shared secret, the session state it produces, and secure requests that
//! encrypt bodies under that secret and receive responses sealed to a
//! per-request key pair.

mod client;
mod config;
mod error;
mod session;
mod transport;

pub use client::*;
pub use config::*;
pub use error::*;
pub use session::*;
pub use transport::*;

/// Default handshake endpoint
pub const DEFAULT_HANDSHAKE_ENDPOINT: &str = "http://localhost:8080/handshake";

/// Default transport timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
