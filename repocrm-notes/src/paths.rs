//! Storage layout for contact notes.
//!
//! ```text
//! <base>/contact-{contactId}/notes/{sessionKey}.json          live note
//! <base>/contact-{contactId}/notes/deleted_{sessionKey}.json  archive
//! <base>/contact-{contactId}/notes/manifest.json              manifest
//! ```

use crate::error::{NotesError, NotesResult};

/// Prefix that turns a session key into an archive id.
pub const DELETED_PREFIX: &str = "deleted_";

const MANIFEST_FILE: &str = "manifest.json";

/// Builds the composite note id `{contactId}_{dateId}`.
pub fn session_key(contact_id: &str, date_id: &str) -> String {
    format!("{contact_id}_{date_id}")
}

/// Archive id for a session key.
pub fn deleted_id(session_key: &str) -> String {
    format!("{DELETED_PREFIX}{session_key}")
}

/// Rejects ids that would escape their directory or collide with the
/// manifest file.
pub fn validate_segment(kind: &str, value: &str) -> NotesResult<()> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
        || value.chars().any(char::is_control)
        || value == MANIFEST_FILE.trim_end_matches(".json");
    if bad {
        return Err(NotesError::InvalidId(format!("{kind} {value:?}")));
    }
    Ok(())
}

/// Checks that `id` names a live note slot: a valid segment that would not
/// be read back as an archive or the manifest.
pub fn validate_live_id(kind: &str, id: &str) -> NotesResult<()> {
    validate_segment(kind, id)?;
    match NotePaths::classify(&format!("{id}.json")) {
        NoteFile::Live(_) => Ok(()),
        _ => Err(NotesError::InvalidId(format!("{kind} {id:?}"))),
    }
}

/// What a file in a notes directory is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteFile {
    Live(String),
    Archive(String),
    Manifest,
    Other,
}

/// Resolves note paths under a base directory.
#[derive(Debug, Clone)]
pub struct NotePaths {
    base: String,
}

impl NotePaths {
    pub fn new(base_path: &str) -> Self {
        Self {
            base: base_path.trim_matches('/').to_string(),
        }
    }

    pub fn notes_dir(&self, contact_id: &str) -> String {
        if self.base.is_empty() {
            format!("contact-{contact_id}/notes")
        } else {
            format!("{}/contact-{contact_id}/notes", self.base)
        }
    }

    pub fn note(&self, contact_id: &str, session_key: &str) -> String {
        format!("{}/{session_key}.json", self.notes_dir(contact_id))
    }

    pub fn archive(&self, contact_id: &str, session_key: &str) -> String {
        format!("{}/{}.json", self.notes_dir(contact_id), deleted_id(session_key))
    }

    pub fn manifest(&self, contact_id: &str) -> String {
        format!("{}/{MANIFEST_FILE}", self.notes_dir(contact_id))
    }

    /// Classifies a listed file by name.
    pub fn classify(path: &str) -> NoteFile {
        let name = path.rsplit('/').next().unwrap_or(path);
        if name == MANIFEST_FILE {
            return NoteFile::Manifest;
        }
        let Some(stem) = name.strip_suffix(".json") else {
            return NoteFile::Other;
        };
        match stem.strip_prefix(DELETED_PREFIX) {
            Some(original) if !original.is_empty() => NoteFile::Archive(original.to_string()),
            Some(_) => NoteFile::Other,
            None if !stem.is_empty() => NoteFile::Live(stem.to_string()),
            None => NoteFile::Other,
        }
    }
}
