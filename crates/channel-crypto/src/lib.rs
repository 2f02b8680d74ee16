//! Channel Crypto - primitives for the ephemeral secure channel
//!
//! RSA-OAEP(SHA-256) ephemeral key pairs for handshake and response
//! confidentiality, SHA-256 key derivation and AES-256-CBC envelopes for
//! request bodies.

mod envelope;
mod error;
mod keypair;
mod responder;

pub use envelope::*;
pub use error::*;
pub use keypair::*;
pub use responder::*;

/// Default RSA modulus size for ephemeral key pairs
pub const RSA_KEY_BITS: usize = 2048;

/// Smallest RSA modulus accepted for generation
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// Largest RSA modulus `rsa` accepts when decoding a public key
pub const MAX_RSA_KEY_BITS: usize = 4096;

/// AES block size, and therefore IV size (128 bits / 16 bytes)
pub const IV_SIZE: usize = 16;

/// Derived symmetric key size (256 bits / 32 bytes)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// OAEP with SHA-256 consumes `2 * 32 + 2` bytes of every RSA block
pub const OAEP_SHA256_OVERHEAD: usize = 66;
