//! Per-login encryption session.
//!
//! An [`EncryptionService`] is created when the user signs in and dropped
//! (or cleared) on logout. It is the only encryption surface the CRM's
//! screens and stores are allowed to use; key derivation and the raw
//! cipher stay inside `repocrm-crypto`.
//!
//! Lifecycle: `Uninitialized --initialize_from_login--> Ready --clear_key--> Uninitialized`.

use repocrm_crypto::{CipherBackend, LoginIdentity, backend_for};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

pub use repocrm_crypto::{BackendKind, CryptoError, CryptoResult, EncryptedBlob, KdfParams, LoginType};

/// Configuration for the encryption session.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Which cipher backend to build. Only `local` is functional.
    #[serde(default)]
    pub backend: BackendKind,

    /// Argon2id cost. Leave at the default outside of tests.
    #[serde(default)]
    pub kdf: KdfParams,
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Ready,
}

/// Introspection data for the UI. Contains labels only, never key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub ready: bool,
    #[serde(rename = "type")]
    pub backend_type: BackendKind,
    pub login_type: Option<LoginType>,
    pub identifier: Option<String>,
}

#[derive(Debug, Clone)]
struct ActiveLogin {
    identifier: String,
    login_type: LoginType,
}

/// Session-scoped encryption context.
pub struct EncryptionService {
    backend: Arc<dyn CipherBackend>,
    login: RwLock<Option<ActiveLogin>>,
}

impl EncryptionService {
    pub fn new(config: &EncryptionConfig) -> Self {
        Self::with_backend(backend_for(config.backend, config.kdf))
    }

    /// Builds a session around an existing backend.
    pub fn with_backend(backend: Arc<dyn CipherBackend>) -> Self {
        Self {
            backend,
            login: RwLock::new(None),
        }
    }

    /// Derives the session key from the login and moves to `Ready`.
    ///
    /// Key derivation runs on the blocking pool. On failure the session
    /// stays (or becomes) `Uninitialized`.
    pub async fn initialize_from_login(
        &self,
        identifier: &str,
        login_type: LoginType,
        credential: Option<&str>,
    ) -> CryptoResult<()> {
        let identity = LoginIdentity::new(identifier, login_type, credential);
        let backend = Arc::clone(&self.backend);

        let derived = tokio::task::spawn_blocking(move || backend.initialize(&identity))
            .await
            .map_err(|e| CryptoError::KeyDerivation(format!("derivation task failed: {e}")))?;

        if let Err(e) = derived {
            warn!("session initialization failed for {login_type} login: {e}");
            self.clear_key();
            return Err(e);
        }

        *self.login.write().unwrap_or_else(|p| p.into_inner()) = Some(ActiveLogin {
            identifier: identifier.to_string(),
            login_type,
        });
        info!(
            "encryption session ready ({} backend, {login_type} login)",
            self.backend.kind()
        );
        Ok(())
    }

    /// Discards the cached key. Call on logout.
    pub fn clear_key(&self) {
        self.backend.clear();
        let previous = self.login.write().unwrap_or_else(|p| p.into_inner()).take();
        if previous.is_some() {
            info!("encryption session cleared");
        }
    }

    pub fn state(&self) -> SessionState {
        if self.is_ready() {
            SessionState::Ready
        } else {
            SessionState::Uninitialized
        }
    }

    pub fn is_ready(&self) -> bool {
        self.current_login().is_some() && self.backend.is_ready()
    }

    pub fn metadata(&self) -> SessionMetadata {
        let login = self.current_login();
        SessionMetadata {
            ready: self.is_ready(),
            backend_type: self.backend.kind(),
            login_type: login.as_ref().map(|l| l.login_type),
            identifier: login.map(|l| l.identifier),
        }
    }

    /// Identifier of the signed-in user, if any.
    pub fn identifier(&self) -> Option<String> {
        self.current_login().map(|l| l.identifier)
    }

    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<EncryptedBlob> {
        self.ensure_ready()?;
        self.backend.encrypt(plaintext)
    }

    pub fn decrypt(&self, blob: &EncryptedBlob) -> CryptoResult<String> {
        self.ensure_ready()?;
        self.backend.decrypt(blob)
    }

    pub fn encrypt_object<T: Serialize + ?Sized>(&self, value: &T) -> CryptoResult<EncryptedBlob> {
        self.ensure_ready()?;
        self.backend.encrypt_object(value)
    }

    pub fn decrypt_object<T: DeserializeOwned>(&self, blob: &EncryptedBlob) -> CryptoResult<T> {
        self.ensure_ready()?;
        self.backend.decrypt_object(blob)
    }

    fn current_login(&self) -> Option<ActiveLogin> {
        self.login.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn ensure_ready(&self) -> CryptoResult<()> {
        if self.current_login().is_none() {
            return Err(CryptoError::NotInitialized);
        }
        Ok(())
    }
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService")
            .field("metadata", &self.metadata())
            .finish()
    }
}
