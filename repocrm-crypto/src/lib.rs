//! Encryption layer for repocrm.
//!
//! Provides login-derived note encryption using:
//! - Argon2id for deterministic key derivation from the login identity
//! - ChaCha20-Poly1305 with a random 96-bit nonce per message
//! - Zeroization of key material on drop
//!
//! # Key model
//!
//! There is exactly one key per session and it is never stored anywhere.
//! The same login (identifier, login type, credential) always re-derives
//! the same key, so any device can read the notes after signing in. There
//! is no recovery path: a lost credential means the notes are unreadable.
//!
//! Application code should go through `repocrm-session`, not this crate.

pub mod backend;
pub mod cipher;
mod error;
pub mod key;

pub use backend::{BackendKind, CipherBackend, KmsCipherBackend, LocalCipherBackend, backend_for};
pub use cipher::{
    EncryptedBlob, NONCE_SIZE, TAG_SIZE, decrypt, decrypt_object, encrypt, encrypt_object,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{APP_SALT, DerivedKey, KEY_SIZE, KdfParams, LoginIdentity, LoginType, derive_login_key};
