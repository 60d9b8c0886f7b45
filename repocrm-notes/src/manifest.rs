//! Per-contact note index.
//!
//! The manifest is read-modify-written on every save, archive and restore.
//! All mutation lives here as plain methods over the value; the store only
//! loads, calls one of these, and writes the result back with the version
//! token it read.
//!
//! Invariants kept by every method:
//! - one `communications` entry per live note id;
//! - one `deletedNotes` entry per archive id;
//! - an id that has been archived is not also listed in `communications`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Index entry for a live note.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationEntry {
    pub id: String,
    pub file_path: String,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
}

/// Index entry for an archived note.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedNoteEntry {
    /// `deleted_{originalId}`.
    pub id: String,
    pub original_id: String,
    pub deleted_at: DateTime<Utc>,
    pub deleted_by: String,
    pub file_path: String,
    #[serde(rename = "archived_sha")]
    pub archived_sha: String,
    #[serde(default)]
    pub summary: String,
}

/// The manifest document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub communications: Vec<CommunicationEntry>,
    #[serde(default)]
    pub deleted_notes: Vec<DeletedNoteEntry>,
}

impl Manifest {
    pub fn communication(&self, id: &str) -> Option<&CommunicationEntry> {
        self.communications.iter().find(|e| e.id == id)
    }

    pub fn deleted(&self, deleted_id: &str) -> Option<&DeletedNoteEntry> {
        self.deleted_notes.iter().find(|e| e.id == deleted_id)
    }

    /// Whether `id` currently sits in the archive.
    pub fn is_archived(&self, id: &str) -> bool {
        self.deleted_notes.iter().any(|e| e.original_id == id)
    }

    /// Adds `entry`, or refreshes summary and timestamp of the existing
    /// entry with the same id. Returns true when a new entry was added.
    pub fn upsert_communication(&mut self, entry: CommunicationEntry) -> bool {
        match self.communications.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => {
                existing.summary = entry.summary;
                existing.timestamp = entry.timestamp;
                existing.file_path = entry.file_path;
                false
            }
            None => {
                self.communications.push(entry);
                true
            }
        }
    }

    pub fn remove_communication(&mut self, id: &str) -> Option<CommunicationEntry> {
        let pos = self.communications.iter().position(|e| e.id == id)?;
        Some(self.communications.remove(pos))
    }

    /// Moves a note from `communications` to `deletedNotes`.
    pub fn record_archive(&mut self, entry: DeletedNoteEntry) {
        self.remove_communication(&entry.original_id);
        self.deleted_notes.retain(|e| e.id != entry.id);
        self.deleted_notes.push(entry);
    }

    pub fn remove_deleted(&mut self, deleted_id: &str) -> Option<DeletedNoteEntry> {
        let pos = self.deleted_notes.iter().position(|e| e.id == deleted_id)?;
        Some(self.deleted_notes.remove(pos))
    }

    /// Moves a note from `deletedNotes` back to `communications`.
    pub fn record_restore(&mut self, deleted_id: &str, entry: CommunicationEntry) {
        self.remove_deleted(deleted_id);
        self.upsert_communication(entry);
    }

    /// Drops entries whose files are gone. Returns the removed
    /// `(communication ids, deleted ids)`.
    pub fn prune_missing(
        &mut self,
        live: &BTreeSet<String>,
        archived: &BTreeSet<String>,
    ) -> (Vec<String>, Vec<String>) {
        let mut removed_live = Vec::new();
        self.communications.retain(|e| {
            let keep = live.contains(&e.id);
            if !keep {
                removed_live.push(e.id.clone());
            }
            keep
        });

        let mut removed_deleted = Vec::new();
        self.deleted_notes.retain(|e| {
            let keep = archived.contains(&e.original_id);
            if !keep {
                removed_deleted.push(e.id.clone());
            }
            keep
        });

        (removed_live, removed_deleted)
    }

    /// Live note ids on disk that have no entry.
    pub fn unindexed_live(&self, live: &BTreeSet<String>) -> Vec<String> {
        live.iter()
            .filter(|id| self.communication(id).is_none())
            .cloned()
            .collect()
    }

    /// Archived original ids on disk that have no entry.
    pub fn unindexed_archives(&self, archived: &BTreeSet<String>) -> Vec<String> {
        archived
            .iter()
            .filter(|id| !self.is_archived(id))
            .cloned()
            .collect()
    }
}
