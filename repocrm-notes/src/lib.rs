//! Encrypted contact notes for the repository-backed CRM.
//!
//! Notes live as JSON files in a versioned file store (a GitHub repository
//! in production, [`MemoryBackend`] in tests). Note bodies are encrypted
//! through the session's [`EncryptionService`](repocrm_session::EncryptionService);
//! a per-contact manifest indexes live and archived notes.
//!
//! Deletion is two-phase: the note is archived under `deleted_{id}` before
//! the live file is removed, so a failure never loses content.

pub mod backend;
pub mod config;
pub mod error;
pub mod locks;
pub mod manifest;
pub mod paths;
pub mod store;
pub mod types;

pub use backend::{MemoryBackend, StoredFile, VersionedFileBackend};
pub use config::NotesConfig;
pub use error::{BackendError, NotesError, NotesResult};
pub use manifest::{CommunicationEntry, DeletedNoteEntry, Manifest};
pub use paths::NotePaths;
pub use store::NotesStore;
pub use types::{
    ArchivedContent, DeletedMeta, LoadedDeletedNote, LoadedNote, NoteRecord, RepairReport,
};
