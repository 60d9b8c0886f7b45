//! Crypto error types.

use crate::key::LoginType;
use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by key derivation, the cipher, and cipher backends.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("login type {0} requires a credential")]
    InvalidCredential(LoginType),

    #[error("unsupported login type: {0}")]
    UnsupportedLoginType(String),

    #[error("encryption key not initialized")]
    KeyNotInitialized,

    /// Wrong key, tampered or truncated blob and tag mismatch all map here.
    /// Callers must not be able to tell them apart.
    #[error("decryption failed")]
    Decryption,

    #[error("decrypted payload is not valid structured data: {0}")]
    MalformedPayload(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption service not initialized")]
    NotInitialized,

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
}
