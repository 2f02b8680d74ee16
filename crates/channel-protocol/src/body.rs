//! Text-safe body encoding
//!
//! Every request and response body on the wire is standard base64 of the
//! raw bytes (an envelope or an RSA ciphertext).

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::ProtocolResult;

/// Encode raw bytes as a transport body
pub fn encode_body(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode a transport body back into raw bytes
///
/// Surrounding whitespace (such as a trailing newline added by a proxy)
/// is ignored; anything else that is not base64 is rejected.
pub fn decode_body(body: &str) -> ProtocolResult<Vec<u8>> {
    Ok(BASE64.decode(body.trim())?)
}
