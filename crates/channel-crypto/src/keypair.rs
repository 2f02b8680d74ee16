//! Ephemeral RSA key pairs and their textual public key encodings

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use channel_protocol::PublicKeyFormat;
use rand::rngs::OsRng;
use rsa::{
    BigUint, Oaep, RsaPrivateKey, RsaPublicKey,
    pkcs8::{DecodePublicKey, EncodePublicKey},
    traits::PublicKeyParts,
};
use sha2::Sha256;

use crate::{
    CryptoError, CryptoResult, MAX_RSA_KEY_BITS, MIN_RSA_KEY_BITS, OAEP_SHA256_OVERHEAD,
    RSA_KEY_BITS,
};

/// Key pair owned by exactly one handshake or secure request
///
/// The private half is zeroed when the pair is dropped.
pub struct KeyPair {
    private: RsaPrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new 2048-bit key pair
    pub fn generate() -> CryptoResult<Self> {
        Self::generate_with_bits(RSA_KEY_BITS)
    }

    /// Generate a key pair with a custom modulus size
    pub fn generate_with_bits(bits: usize) -> CryptoResult<Self> {
        if bits < MIN_RSA_KEY_BITS {
            return Err(CryptoError::KeyTooSmall {
                bits,
                min: MIN_RSA_KEY_BITS,
            });
        }
        // Peers could not decode anything wider
        if bits > MAX_RSA_KEY_BITS {
            return Err(CryptoError::KeyTooLarge {
                bits,
                max: MAX_RSA_KEY_BITS,
            });
        }

        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = PublicKey(RsaPublicKey::from(&private));

        Ok(Self { private, public })
    }

    /// Get the public half
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Render the public half for a key header
    pub fn encode_public_key(&self, format: PublicKeyFormat) -> CryptoResult<String> {
        self.public.encode(format)
    }

    /// Decrypt an RSA-OAEP(SHA-256) ciphertext addressed to this pair
    pub fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        self.private
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|_| CryptoError::AsymmetricDecryptionFailed)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.public.bits())
            .finish_non_exhaustive()
    }
}

/// RSA public key as exchanged through the key headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    /// Parse a key header value, detecting its format
    pub fn decode(text: &str) -> CryptoResult<Self> {
        let text = text.trim();
        match PublicKeyFormat::detect(text) {
            PublicKeyFormat::Xml => Self::decode_xml(text),
            PublicKeyFormat::SpkiDer => Self::decode_spki(text),
        }
    }

    /// Render as key header text
    pub fn encode(&self, format: PublicKeyFormat) -> CryptoResult<String> {
        match format {
            PublicKeyFormat::Xml => Ok(format!(
                "<RSAKeyValue><Modulus>{}</Modulus><Exponent>{}</Exponent></RSAKeyValue>",
                BASE64.encode(self.0.n().to_bytes_be()),
                BASE64.encode(self.0.e().to_bytes_be()),
            )),
            PublicKeyFormat::SpkiDer => {
                let der = self
                    .0
                    .to_public_key_der()
                    .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
                Ok(BASE64.encode(der.as_bytes()))
            }
        }
    }

    /// Encrypt with RSA-OAEP(SHA-256)
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let max = self.max_plaintext_len();
        if plaintext.len() > max {
            return Err(CryptoError::PayloadTooLarge {
                size: plaintext.len(),
                max,
            });
        }

        self.0
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Largest plaintext a single OAEP block can carry under this key
    pub fn max_plaintext_len(&self) -> usize {
        self.0.size().saturating_sub(OAEP_SHA256_OVERHEAD)
    }

    /// Modulus size in bits
    pub fn bits(&self) -> usize {
        self.0.n().bits()
    }

    fn decode_xml(text: &str) -> CryptoResult<Self> {
        let modulus = xml_element(text, "Modulus")?;
        let exponent = xml_element(text, "Exponent")?;

        let n = BigUint::from_bytes_be(&decode_base64(modulus)?);
        let e = BigUint::from_bytes_be(&decode_base64(exponent)?);

        RsaPublicKey::new(n, e)
            .map(Self)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    fn decode_spki(text: &str) -> CryptoResult<Self> {
        let der = decode_base64(text)?;
        RsaPublicKey::from_public_key_der(&der)
            .map(Self)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

/// Text between `<tag>` and `</tag>`
fn xml_element<'a>(text: &'a str, tag: &str) -> CryptoResult<&'a str> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let start = text
        .find(&open)
        .map(|i| i + open.len())
        .ok_or_else(|| CryptoError::InvalidPublicKey(format!("missing <{tag}>")))?;
    let len = text[start..]
        .find(&close)
        .ok_or_else(|| CryptoError::InvalidPublicKey(format!("unterminated <{tag}>")))?;

    Ok(text[start..start + len].trim())
}

fn decode_base64(text: &str) -> CryptoResult<Vec<u8>> {
    let bytes = BASE64
        .decode(text)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    if bytes.is_empty() {
        return Err(CryptoError::InvalidPublicKey("empty key component".into()));
    }
    Ok(bytes)
}
