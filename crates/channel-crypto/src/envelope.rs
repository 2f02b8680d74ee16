//! Symmetric key derivation and the `IV || ciphertext` envelope

use std::fmt;

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use channel_protocol::{decode_body, encode_body};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::{CryptoError, CryptoResult, IV_SIZE, SYMMETRIC_KEY_SIZE};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES-256 key derived from a session secret
///
/// Recomputed for every operation instead of being cached next to the
/// secret; dropping it zeroes the key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey(Zeroizing<[u8; SYMMETRIC_KEY_SIZE]>);

impl SymmetricKey {
    /// `SHA-256(secret)`
    pub fn derive(secret: &str) -> Self {
        let mut key = Zeroizing::new([0u8; SYMMETRIC_KEY_SIZE]);
        key.copy_from_slice(&Sha256::digest(secret.as_bytes()));
        Self(key)
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// AES-256-CBC ciphertext together with the IV it was produced under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    iv: [u8; IV_SIZE],
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// Encrypt `plaintext` under a freshly drawn random IV
    pub fn seal(plaintext: &[u8], key: &SymmetricKey) -> CryptoResult<Self> {
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        Ok(Self { iv, ciphertext })
    }

    /// Decrypt and strip the PKCS#7 padding
    pub fn open(&self, key: &SymmetricKey) -> CryptoResult<Vec<u8>> {
        Aes256CbcDec::new_from_slices(key.as_bytes(), &self.iv)
            .map_err(|_| CryptoError::DecryptionFailed)?
            .decrypt_padded_vec_mut::<Pkcs7>(&self.ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Get the IV
    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    /// Get the ciphertext without the IV
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Wire form: `iv || ciphertext`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(IV_SIZE + self.ciphertext.len());
        bytes.extend_from_slice(&self.iv);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    /// Split `iv || ciphertext`
    ///
    /// Input shorter than one IV is treated like any other undecryptable
    /// envelope.
    pub fn from_bytes(data: &[u8]) -> CryptoResult<Self> {
        if data.len() < IV_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        let (iv_bytes, ciphertext) = data.split_at(IV_SIZE);
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(iv_bytes);

        Ok(Self {
            iv,
            ciphertext: ciphertext.to_vec(),
        })
    }

    /// Base64 request body
    pub fn to_body(&self) -> String {
        encode_body(&self.to_bytes())
    }

    /// Parse a base64 request body
    pub fn from_body(body: &str) -> CryptoResult<Self> {
        Self::from_bytes(&decode_body(body)?)
    }
}
