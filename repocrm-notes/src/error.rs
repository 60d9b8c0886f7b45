//! Notes storage error types.

use repocrm_session::CryptoError;
use thiserror::Error;

/// Result type for notes operations.
pub type NotesResult<T> = Result<T, NotesError>;

/// Errors reported by a [`VersionedFileBackend`](crate::backend::VersionedFileBackend).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("file not found: {0}")]
    NotFound(String),

    /// The supplied version token does not match the stored file, or a
    /// create was attempted on a path that already exists.
    #[error("version conflict on {0}")]
    Conflict(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

/// Errors that can occur in note storage operations.
#[derive(Debug, Error)]
pub enum NotesError {
    #[error("note not found: {0}")]
    NoteNotFound(String),

    #[error("note {0} is archived; restore it before editing")]
    NoteArchived(String),

    /// Someone else wrote the file since it was read. Re-read and retry.
    #[error("conflicting write on {0}")]
    Conflict(String),

    #[error("failed to write archive for {session_key}; live note left intact")]
    ArchiveWrite {
        session_key: String,
        #[source]
        source: BackendError,
    },

    /// The archive copy exists but the live note could not be removed.
    /// Both copies are now in storage and need manual reconciliation.
    #[error("archived {session_key} to {archive_path} but could not delete the original")]
    OrphanedArchive {
        session_key: String,
        archive_path: String,
        #[source]
        source: BackendError,
    },

    #[error("note files updated but manifest for contact {contact_id} was not")]
    ManifestUpdate {
        contact_id: String,
        #[source]
        source: Box<NotesError>,
    },

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("storage backend error: {0}")]
    Backend(BackendError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stored file is not valid base64: {0}")]
    Encoding(String),
}

impl From<BackendError> for NotesError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Conflict(path) => NotesError::Conflict(path),
            other => NotesError::Backend(other),
        }
    }
}
