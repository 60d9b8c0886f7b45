//! ChaCha20-Poly1305 encryption of strings and serde values.
//!
//! Every blob is `base64(nonce || ciphertext || tag)` with a fresh 96-bit
//! nonce per call, so encrypting the same plaintext twice never yields the
//! same blob.

use crate::error::{CryptoError, CryptoResult};
use crate::key::DerivedKey;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nonce length in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag length in bytes.
pub const TAG_SIZE: usize = 16;

/// Nonce and ciphertext, base64-encoded as one token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedBlob(String);

impl EncryptedBlob {
    /// Wraps a token read from storage. No validation happens until decrypt.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedBlob({} chars)", self.0.len())
    }
}

impl fmt::Display for EncryptedBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn cipher_for(key: &DerivedKey) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

/// Encrypts a string under `key`.
pub fn encrypt(key: Option<&DerivedKey>, plaintext: &str) -> CryptoResult<EncryptedBlob> {
    let key = key.ok_or(CryptoError::KeyNotInitialized)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = cipher_for(key)
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut packed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    packed.extend_from_slice(&nonce_bytes);
    packed.extend_from_slice(&ciphertext);

    Ok(EncryptedBlob(STANDARD.encode(packed)))
}

/// Decrypts a blob produced by [`encrypt`].
pub fn decrypt(key: Option<&DerivedKey>, blob: &EncryptedBlob) -> CryptoResult<String> {
    let key = key.ok_or(CryptoError::KeyNotInitialized)?;

    let packed = STANDARD
        .decode(blob.as_str())
        .map_err(|_| CryptoError::Decryption)?;
    if packed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Decryption);
    }

    let (nonce, ciphertext) = packed.split_at(NONCE_SIZE);
    let plaintext = cipher_for(key)
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decryption)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption)
}

/// Serializes `value` to JSON and encrypts it.
pub fn encrypt_object<T: Serialize + ?Sized>(
    key: Option<&DerivedKey>,
    value: &T,
) -> CryptoResult<EncryptedBlob> {
    let json = serde_json::to_string(value).map_err(|e| CryptoError::Encryption(e.to_string()))?;
    encrypt(key, &json)
}

/// Decrypts a blob and parses the plaintext as JSON.
pub fn decrypt_object<T: DeserializeOwned>(
    key: Option<&DerivedKey>,
    blob: &EncryptedBlob,
) -> CryptoResult<T> {
    let json = decrypt(key, blob)?;
    serde_json::from_str(&json).map_err(|e| CryptoError::MalformedPayload(e.to_string()))
}
