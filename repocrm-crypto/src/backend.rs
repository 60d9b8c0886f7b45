//! Cipher backends behind a uniform interface.
//!
//! Callers hold an `Arc<dyn CipherBackend>` and never see raw keys.
//! [`LocalCipherBackend`] derives and caches the login key in memory;
//! [`KmsCipherBackend`] reserves the slot for a remote key service and
//! fails every operation until one exists.

use crate::cipher::{self, EncryptedBlob};
use crate::error::{CryptoError, CryptoResult};
use crate::key::{DerivedKey, KdfParams, LoginIdentity, derive_login_key};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Which backend a session encrypts with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Kms,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => f.write_str("local"),
            BackendKind::Kms => f.write_str("kms"),
        }
    }
}

/// Trait for key-holding encrypt/decrypt backends.
///
/// Implementations own the key material for the lifetime of a session.
pub trait CipherBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Establishes key material for `identity`. May block for a long time.
    fn initialize(&self, identity: &LoginIdentity) -> CryptoResult<()>;

    /// Discards key material. Safe to call when nothing is cached.
    fn clear(&self);

    fn is_ready(&self) -> bool;

    fn encrypt(&self, plaintext: &str) -> CryptoResult<EncryptedBlob>;

    fn decrypt(&self, blob: &EncryptedBlob) -> CryptoResult<String>;
}

impl dyn CipherBackend {
    /// JSON-serializes `value` and encrypts it.
    pub fn encrypt_object<T: Serialize + ?Sized>(&self, value: &T) -> CryptoResult<EncryptedBlob> {
        let json =
            serde_json::to_string(value).map_err(|e| CryptoError::Encryption(e.to_string()))?;
        self.encrypt(&json)
    }

    /// Decrypts `blob` and parses the plaintext as JSON.
    pub fn decrypt_object<T: DeserializeOwned>(&self, blob: &EncryptedBlob) -> CryptoResult<T> {
        let json = self.decrypt(blob)?;
        serde_json::from_str(&json).map_err(|e| CryptoError::MalformedPayload(e.to_string()))
    }
}

/// Builds the backend for `kind`.
pub fn backend_for(kind: BackendKind, kdf: KdfParams) -> Arc<dyn CipherBackend> {
    match kind {
        BackendKind::Local => Arc::new(LocalCipherBackend::new(kdf)),
        BackendKind::Kms => Arc::new(KmsCipherBackend),
    }
}

// ============================================================================
// Local backend
// ============================================================================

/// Derives the key from the login and keeps it in process memory.
pub struct LocalCipherBackend {
    kdf: KdfParams,
    key: RwLock<Option<DerivedKey>>,
}

impl LocalCipherBackend {
    pub fn new(kdf: KdfParams) -> Self {
        Self {
            kdf,
            key: RwLock::new(None),
        }
    }

    fn with_key<T>(&self, f: impl FnOnce(Option<&DerivedKey>) -> T) -> T {
        let guard = self.key.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(guard.as_ref())
    }
}

impl CipherBackend for LocalCipherBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn initialize(&self, identity: &LoginIdentity) -> CryptoResult<()> {
        let key = derive_login_key(identity, &self.kdf)?;
        let mut guard = self.key.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(key);
        debug!("local cipher key derived for {} login", identity.login_type);
        Ok(())
    }

    fn clear(&self) {
        let mut guard = self.key.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = None;
    }

    fn is_ready(&self) -> bool {
        self.with_key(|k| k.is_some())
    }

    fn encrypt(&self, plaintext: &str) -> CryptoResult<EncryptedBlob> {
        self.with_key(|k| cipher::encrypt(k, plaintext))
    }

    fn decrypt(&self, blob: &EncryptedBlob) -> CryptoResult<String> {
        self.with_key(|k| cipher::decrypt(k, blob))
    }
}

// ============================================================================
// KMS backend (reserved)
// ============================================================================

/// Placeholder for a remote key management service. Never ready.
pub struct KmsCipherBackend;

impl CipherBackend for KmsCipherBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Kms
    }

    fn initialize(&self, _identity: &LoginIdentity) -> CryptoResult<()> {
        Err(CryptoError::NotImplemented("KMS backend initialize"))
    }

    fn clear(&self) {}

    fn is_ready(&self) -> bool {
        false
    }

    fn encrypt(&self, _plaintext: &str) -> CryptoResult<EncryptedBlob> {
        Err(CryptoError::NotImplemented("KMS backend encrypt"))
    }

    fn decrypt(&self, _blob: &EncryptedBlob) -> CryptoResult<String> {
        Err(CryptoError::NotImplemented("KMS backend decrypt"))
    }
}
