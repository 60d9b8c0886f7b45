//! Shared helpers for notes store tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use repocrm_notes::{
    BackendError, Manifest, MemoryBackend, NotesConfig, NotesStore, StoredFile,
    VersionedFileBackend,
};
use repocrm_session::{EncryptionConfig, EncryptionService, KdfParams, LoginType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Routes store logs to the test harness. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("repocrm_notes=debug"))
        .with_test_writer()
        .try_init();
}

pub const CONTACT: &str = "42";
pub const DATE_ID: &str = "20250101T120000";
pub const SESSION_KEY: &str = "42_20250101T120000";

/// Session with cheap KDF params, logged in as `a@b.com`.
pub async fn ready_session() -> Arc<EncryptionService> {
    let session = Arc::new(EncryptionService::new(&EncryptionConfig {
        kdf: KdfParams::testing(),
        ..Default::default()
    }));
    session
        .initialize_from_login("a@b.com", LoginType::Email, Some("pw"))
        .await
        .expect("login must succeed");
    session
}

pub async fn store_with(backend: Arc<dyn VersionedFileBackend>) -> (NotesStore, Arc<EncryptionService>) {
    let session = ready_session().await;
    let store = NotesStore::new(backend, Arc::clone(&session), NotesConfig::default());
    (store, session)
}

/// Decodes a stored file body back into JSON.
pub fn decode(file: &StoredFile) -> serde_json::Value {
    let bytes = STANDARD.decode(&file.content).expect("stored content is base64");
    serde_json::from_slice(&bytes).expect("stored content is JSON")
}

pub async fn read_json(backend: &dyn VersionedFileBackend, path: &str) -> serde_json::Value {
    decode(&backend.get(path).await.expect("file exists"))
}

pub async fn read_manifest(backend: &dyn VersionedFileBackend, contact: &str) -> Manifest {
    let path = format!("data/contact-{contact}/notes/manifest.json");
    serde_json::from_value(read_json(backend, &path).await).expect("manifest parses")
}

/// Memory backend with switchable failures.
#[derive(Default)]
pub struct FlakyBackend {
    pub inner: MemoryBackend,
    fail_puts_containing: Mutex<Option<String>>,
    fail_deletes: AtomicBool,
    race_on_read: Mutex<Option<String>>,
}

impl FlakyBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fails every put whose path contains `fragment`.
    pub fn fail_puts_on(&self, fragment: &str) {
        *self.fail_puts_containing.lock().unwrap() = Some(fragment.to_string());
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// The next read of `path` returns the current file, then another writer
    /// replaces it before the caller can write back.
    pub fn race_next_read(&self, path: &str) {
        *self.race_on_read.lock().unwrap() = Some(path.to_string());
    }

    pub fn heal(&self) {
        *self.fail_puts_containing.lock().unwrap() = None;
        self.fail_deletes(false);
    }
}

#[async_trait]
impl VersionedFileBackend for FlakyBackend {
    async fn get(&self, path: &str) -> Result<StoredFile, BackendError> {
        let file = self.inner.get(path).await?;
        let armed = {
            let mut race = self.race_on_read.lock().unwrap();
            race.take_if(|p| p.as_str() == path).is_some()
        };
        if armed {
            self.inner
                .put(path, "e30=", "concurrent writer", Some(&file.version))
                .await?;
        }
        Ok(file)
    }

    async fn put(
        &self,
        path: &str,
        content: &str,
        message: &str,
        version: Option<&str>,
    ) -> Result<String, BackendError> {
        let failing = self.fail_puts_containing.lock().unwrap().clone();
        if failing.is_some_and(|f| path.contains(&f)) {
            return Err(BackendError::Unavailable(format!("injected put failure on {path}")));
        }
        self.inner.put(path, content, message, version).await
    }

    async fn delete(&self, path: &str, version: &str, message: &str) -> Result<(), BackendError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable(format!("injected delete failure on {path}")));
        }
        self.inner.delete(path, version, message).await
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>, BackendError> {
        self.inner.list(dir).await
    }
}
