//! Versioned file storage seam.
//!
//! Every stored file carries a version token. Overwrites and deletes must
//! present the token they last saw; a stale token is a conflict rather
//! than a silent overwrite. File contents cross this interface as base64.

use crate::error::BackendError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

/// A file as read from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Base64-encoded file body.
    pub content: String,
    /// Opaque version token (a content hash on GitHub).
    pub version: String,
}

/// Remote read-modify-write file store.
#[async_trait]
pub trait VersionedFileBackend: Send + Sync {
    /// Reads a file. Missing files are `BackendError::NotFound`.
    async fn get(&self, path: &str) -> Result<StoredFile, BackendError>;

    /// Creates (`version == None`) or overwrites a file and returns its new
    /// version token.
    async fn put(
        &self,
        path: &str,
        content: &str,
        message: &str,
        version: Option<&str>,
    ) -> Result<String, BackendError>;

    /// Deletes a file at the given version.
    async fn delete(&self, path: &str, version: &str, message: &str) -> Result<(), BackendError>;

    /// Lists file paths directly inside `dir`. A missing directory is empty.
    async fn list(&self, dir: &str) -> Result<Vec<String>, BackendError>;
}

/// In-process backend with the same conflict rules as the remote store.
///
/// Version tokens are the hex SHA-256 of the stored content.
#[derive(Default)]
pub struct MemoryBackend {
    files: RwLock<BTreeMap<String, StoredFile>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files.
    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }

    /// Whether a file exists at `path`.
    pub async fn contains(&self, path: &str) -> bool {
        self.files.read().await.contains_key(path)
    }

    fn version_of(content: &str) -> String {
        hex::encode(Sha256::digest(content.as_bytes()))
    }
}

#[async_trait]
impl VersionedFileBackend for MemoryBackend {
    async fn get(&self, path: &str) -> Result<StoredFile, BackendError> {
        self.files
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(path.to_string()))
    }

    async fn put(
        &self,
        path: &str,
        content: &str,
        message: &str,
        version: Option<&str>,
    ) -> Result<String, BackendError> {
        let mut files = self.files.write().await;

        match (files.get(path), version) {
            (Some(existing), Some(v)) if existing.version == v => {}
            (None, None) => {}
            _ => return Err(BackendError::Conflict(path.to_string())),
        }

        let new_version = Self::version_of(content);
        files.insert(
            path.to_string(),
            StoredFile {
                content: content.to_string(),
                version: new_version.clone(),
            },
        );
        debug!("memory backend put {path} ({} bytes): {message}", content.len());
        Ok(new_version)
    }

    async fn delete(&self, path: &str, version: &str, message: &str) -> Result<(), BackendError> {
        let mut files = self.files.write().await;

        match files.get(path) {
            None => return Err(BackendError::NotFound(path.to_string())),
            Some(existing) if existing.version != version => {
                return Err(BackendError::Conflict(path.to_string()));
            }
            Some(_) => {}
        }

        files.remove(path);
        debug!("memory backend delete {path}: {message}");
        Ok(())
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>, BackendError> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let files = self.files.read().await;
        Ok(files
            .keys()
            .filter(|p| {
                p.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_overwrite_with_token() {
        let backend = MemoryBackend::new();
        let v1 = backend.put("a/b.json", "eA==", "create", None).await.unwrap();
        let v2 = backend.put("a/b.json", "eQ==", "update", Some(&v1)).await.unwrap();
        assert_ne!(v1, v2);
        assert_eq!(backend.get("a/b.json").await.unwrap().version, v2);
    }

    #[tokio::test]
    async fn stale_token_is_conflict() {
        let backend = MemoryBackend::new();
        let v1 = backend.put("f", "eA==", "create", None).await.unwrap();
        backend.put("f", "eQ==", "update", Some(&v1)).await.unwrap();
        let err = backend.put("f", "eg==", "late", Some(&v1)).await.unwrap_err();
        assert_eq!(err, BackendError::Conflict("f".into()));
    }

    #[tokio::test]
    async fn create_over_existing_is_conflict() {
        let backend = MemoryBackend::new();
        backend.put("f", "eA==", "create", None).await.unwrap();
        assert!(matches!(
            backend.put("f", "eQ==", "create again", None).await,
            Err(BackendError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn token_for_missing_file_is_conflict() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.put("f", "eA==", "update", Some("abc")).await,
            Err(BackendError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn delete_checks_token_and_existence() {
        let backend = MemoryBackend::new();
        let v = backend.put("f", "eA==", "create", None).await.unwrap();
        assert!(matches!(backend.delete("f", "stale", "rm").await, Err(BackendError::Conflict(_))));
        backend.delete("f", &v, "rm").await.unwrap();
        assert!(matches!(backend.delete("f", &v, "rm").await, Err(BackendError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_returns_direct_children_only() {
        let backend = MemoryBackend::new();
        backend.put("d/one.json", "eA==", "c", None).await.unwrap();
        backend.put("d/two.json", "eA==", "c", None).await.unwrap();
        backend.put("d/sub/three.json", "eA==", "c", None).await.unwrap();
        backend.put("dd/four.json", "eA==", "c", None).await.unwrap();

        let listed = backend.list("d").await.unwrap();
        assert_eq!(listed, vec!["d/one.json".to_string(), "d/two.json".to_string()]);
        assert!(backend.list("missing").await.unwrap().is_empty());
    }
}
