//! Textual public key formats accepted in the key headers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// How a public key is rendered into header text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublicKeyFormat {
    /// `<RSAKeyValue><Modulus>..</Modulus><Exponent>..</Exponent></RSAKeyValue>`
    Xml,
    /// Base64 of the DER-encoded SubjectPublicKeyInfo
    SpkiDer,
}

impl PublicKeyFormat {
    /// Guess the format of a received key
    pub fn detect(text: &str) -> Self {
        if text.trim_start().starts_with('<') {
            Self::Xml
        } else {
            Self::SpkiDer
        }
    }
}

impl Default for PublicKeyFormat {
    fn default() -> Self {
        Self::Xml
    }
}

impl fmt::Display for PublicKeyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xml => f.write_str("xml"),
            Self::SpkiDer => f.write_str("spki-der"),
        }
    }
}

impl FromStr for PublicKeyFormat {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xml" => Ok(Self::Xml),
            "spki-der" | "spki" | "der" => Ok(Self::SpkiDer),
            other => Err(ProtocolError::UnknownKeyFormat(other.to_string())),
        }
    }
}
