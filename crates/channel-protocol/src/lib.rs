//! Shared Protocol Definitions for the ephemeral secure channel
//!
//! This crate contains the header names, wire encodings and payload types
//! shared by clients and servers speaking the channel protocol.

mod body;
mod error;
mod handshake;
mod key_format;

pub use body::*;
pub use error::*;
pub use handshake::*;
pub use key_format::*;

/// Request header carrying the client's ephemeral public key
pub const CLIENT_PUBLIC_KEY_HEADER: &str = "X-Client-PublicKey";

/// Response header carrying the server's public key
pub const SERVER_PUBLIC_KEY_HEADER: &str = "X-Server-PublicKey";

/// Content type of every encoded request and response body
pub const BODY_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
