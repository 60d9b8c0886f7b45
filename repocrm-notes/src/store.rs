//! Encrypted note persistence.
//!
//! Notes are written under a deterministic path per `{contactId}_{dateId}`,
//! so repeated saves of the same session overwrite one file (autosave).
//! Deleting a note archives it first: the original ciphertext is wrapped,
//! re-encrypted as a whole together with audit metadata, written to an
//! archive slot, and only then is the live file removed.

use crate::backend::VersionedFileBackend;
use crate::config::NotesConfig;
use crate::error::{BackendError, NotesError, NotesResult};
use crate::locks::KeyedLocks;
use crate::manifest::{CommunicationEntry, DeletedNoteEntry, Manifest};
use crate::paths::{self, NoteFile, NotePaths};
use crate::types::{
    ArchivedContent, ArchivedNoteFile, DeletedMeta, DeletedNoteWrapper, LoadedDeletedNote,
    LoadedNote, NoteRecord, RepairReport,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use repocrm_session::{CryptoError, EncryptionService};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Per-contact encrypted notes on a versioned file backend.
pub struct NotesStore {
    backend: Arc<dyn VersionedFileBackend>,
    session: Arc<EncryptionService>,
    paths: NotePaths,
    config: NotesConfig,
    note_locks: KeyedLocks,
    manifest_locks: KeyedLocks,
}

impl NotesStore {
    pub fn new(
        backend: Arc<dyn VersionedFileBackend>,
        session: Arc<EncryptionService>,
        config: NotesConfig,
    ) -> Self {
        Self {
            backend,
            session,
            paths: NotePaths::new(&config.base_path),
            config,
            note_locks: KeyedLocks::new(),
            manifest_locks: KeyedLocks::new(),
        }
    }

    pub fn paths(&self) -> &NotePaths {
        &self.paths
    }

    // ── Save / load ──

    /// Creates or overwrites the note for `(contact_id, date_id)`.
    ///
    /// Saves for the same note id are serialized; the first save adds a
    /// manifest entry and later ones only refresh its summary and timestamp.
    pub async fn save_note_by_id(
        &self,
        contact_id: &str,
        date_id: &str,
        content: &str,
        summary: &str,
    ) -> NotesResult<NoteRecord> {
        paths::validate_segment("contact id", contact_id)?;
        paths::validate_segment("date id", date_id)?;

        let session_key = paths::session_key(contact_id, date_id);
        paths::validate_live_id("note id", &session_key)?;
        let path = self.paths.note(contact_id, &session_key);
        let _guard = self.note_locks.lock(&path).await;

        let author = self.session.identifier().ok_or(CryptoError::NotInitialized)?;
        let encrypted = self.session.encrypt(content)?;

        let (manifest, _) = self.load_manifest(contact_id).await?;
        if manifest.is_archived(&session_key) {
            return Err(NotesError::NoteArchived(session_key));
        }

        let existing: Option<(NoteRecord, String)> = self.read_json(&path).await?;
        let now = Utc::now();
        let (created_at, version) = match existing {
            Some((record, version)) => (record.created_at, Some(version)),
            None => (now, None),
        };

        let mut record = NoteRecord {
            id: session_key.clone(),
            contact_id: contact_id.to_string(),
            content: encrypted,
            summary: summary.to_string(),
            created_at,
            updated_at: now,
            author,
            sha: None,
        };

        let message = self.commit_message(&format!("save note {session_key}"));
        let sha = self
            .backend
            .put(&path, &encode_json(&record)?, &message, version.as_deref())
            .await
            .map_err(|e| {
                if let BackendError::Conflict(_) = e {
                    warn!("save of {session_key} lost a race on {path}");
                }
                NotesError::from(e)
            })?;
        record.sha = Some(sha);
        debug!(
            "{} note {session_key}",
            if version.is_none() { "created" } else { "updated" }
        );

        let entry = CommunicationEntry {
            id: session_key,
            file_path: path,
            timestamp: now,
            summary: summary.to_string(),
        };
        self.update_manifest(contact_id, |m| {
            m.upsert_communication(entry);
        })
        .await
        .map_err(|source| {
            error!("note {} saved but manifest update failed: {source}", record.id);
            NotesError::ManifestUpdate {
                contact_id: contact_id.to_string(),
                source: Box::new(source),
            }
        })?;

        Ok(record)
    }

    /// Manifest entries for the contact's live notes.
    pub async fn list_communications(&self, contact_id: &str) -> NotesResult<Vec<CommunicationEntry>> {
        paths::validate_segment("contact id", contact_id)?;
        let (manifest, _) = self.load_manifest(contact_id).await?;
        Ok(manifest.communications)
    }

    /// Reads and decrypts a live note.
    pub async fn load_communication(&self, contact_id: &str, id: &str) -> NotesResult<LoadedNote> {
        paths::validate_segment("contact id", contact_id)?;
        paths::validate_live_id("note id", id)?;

        let path = self.paths.note(contact_id, id);
        let (record, sha) = self
            .read_json::<NoteRecord>(&path)
            .await?
            .ok_or_else(|| NotesError::NoteNotFound(id.to_string()))?;

        let content = self.session.decrypt(&record.content)?;
        Ok(LoadedNote {
            id: record.id,
            contact_id: record.contact_id,
            content,
            summary: record.summary,
            created_at: record.created_at,
            updated_at: record.updated_at,
            author: record.author,
            sha,
        })
    }

    // ── Archive ──

    /// Archives a live note and removes the original.
    ///
    /// Steps: read the note and its version, write the encrypted wrapper to
    /// the archive slot, delete the original at the version read, then move
    /// the manifest entry. A failed archive write leaves the note untouched
    /// (`ArchiveWrite`). A failed delete after a good archive write leaves
    /// both copies behind (`OrphanedArchive`).
    pub async fn archive_and_delete_note(
        &self,
        contact_id: &str,
        session_key: &str,
        deleted_by: &str,
    ) -> NotesResult<DeletedNoteEntry> {
        paths::validate_segment("contact id", contact_id)?;
        paths::validate_live_id("note id", session_key)?;

        let path = self.paths.note(contact_id, session_key);
        let _guard = self.note_locks.lock(&path).await;

        let (record, original_sha) = self
            .read_json::<NoteRecord>(&path)
            .await?
            .ok_or_else(|| NotesError::NoteNotFound(session_key.to_string()))?;

        let deleted_at = Utc::now();
        let wrapper = DeletedNoteWrapper {
            deleted_meta: DeletedMeta {
                deleted_by: deleted_by.to_string(),
                deleted_at,
                original_path: path.clone(),
                original_sha: original_sha.clone(),
                original_created_at: Some(record.created_at),
                summary: Some(record.summary.clone()),
                original_author: Some(record.author.clone()),
            },
            archived_content: record.content.clone(),
        };
        let deleted_id = paths::deleted_id(session_key);
        let archive_file = ArchivedNoteFile {
            id: deleted_id.clone(),
            original_id: session_key.to_string(),
            payload: self.session.encrypt_object(&wrapper)?,
        };
        let body = encode_json(&archive_file)?;

        let archive_path = self.paths.archive(contact_id, session_key);
        let archived_sha = self
            .write_archive(&archive_path, &body, session_key)
            .await
            .map_err(|source| {
                warn!("archive write for {session_key} failed: {source}");
                NotesError::ArchiveWrite {
                    session_key: session_key.to_string(),
                    source,
                }
            })?;

        let message = self.commit_message(&format!("delete archived note {session_key}"));
        if let Err(source) = self.backend.delete(&path, &original_sha, &message).await {
            error!(
                "note {session_key} archived to {archive_path} but original delete failed: {source}"
            );
            return Err(NotesError::OrphanedArchive {
                session_key: session_key.to_string(),
                archive_path,
                source,
            });
        }

        let entry = DeletedNoteEntry {
            id: deleted_id,
            original_id: session_key.to_string(),
            deleted_at,
            deleted_by: deleted_by.to_string(),
            file_path: archive_path,
            archived_sha,
            summary: record.summary,
        };
        let manifest_entry = entry.clone();
        self.update_manifest(contact_id, |m| m.record_archive(manifest_entry))
            .await
            .map_err(|source| {
                error!("note {session_key} archived but manifest update failed: {source}");
                NotesError::ManifestUpdate {
                    contact_id: contact_id.to_string(),
                    source: Box::new(source),
                }
            })?;

        info!("archived note {session_key} for contact {contact_id}");
        Ok(entry)
    }

    /// Manifest entries for the contact's archived notes.
    pub async fn list_deleted_notes(&self, contact_id: &str) -> NotesResult<Vec<DeletedNoteEntry>> {
        paths::validate_segment("contact id", contact_id)?;
        let (manifest, _) = self.load_manifest(contact_id).await?;
        Ok(manifest.deleted_notes)
    }

    /// Opens an archive and recovers the original note body.
    pub async fn load_deleted_note(
        &self,
        contact_id: &str,
        deleted_id: &str,
    ) -> NotesResult<LoadedDeletedNote> {
        let original_id = self.original_id_of(contact_id, deleted_id)?;
        let (file, wrapper, _) = self.open_archive(contact_id, &original_id, deleted_id).await?;

        let inner = self.session.decrypt(&wrapper.archived_content)?;
        Ok(LoadedDeletedNote {
            id: file.id,
            original_id: file.original_id,
            deleted_meta: wrapper.deleted_meta,
            original_note: ArchivedContent::from_plaintext(inner),
        })
    }

    /// Puts an archived note back in its original slot.
    ///
    /// The archived ciphertext is written back unchanged. Fails with
    /// `Conflict` if a live note already occupies the slot.
    pub async fn restore_deleted_note(
        &self,
        contact_id: &str,
        deleted_id: &str,
    ) -> NotesResult<NoteRecord> {
        let original_id = self.original_id_of(contact_id, deleted_id)?;
        let path = self.paths.note(contact_id, &original_id);
        let _guard = self.note_locks.lock(&path).await;

        let (_, wrapper, archive_sha) = self.open_archive(contact_id, &original_id, deleted_id).await?;

        match self.backend.get(&path).await {
            Ok(_) => return Err(NotesError::Conflict(path)),
            Err(BackendError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let (manifest, _) = self.load_manifest(contact_id).await?;
        let indexed_summary = manifest
            .deleted(deleted_id)
            .map(|e| e.summary.clone())
            .filter(|s| !s.is_empty());

        let now = Utc::now();
        let meta = wrapper.deleted_meta;
        let summary = indexed_summary.or(meta.summary).unwrap_or_default();
        let author = match meta.original_author {
            Some(author) => author,
            None => self.session.identifier().ok_or(CryptoError::NotInitialized)?,
        };
        let mut record = NoteRecord {
            id: original_id.clone(),
            contact_id: contact_id.to_string(),
            content: wrapper.archived_content,
            summary,
            created_at: meta.original_created_at.unwrap_or(now),
            updated_at: now,
            author,
            sha: None,
        };

        let message = self.commit_message(&format!("restore note {original_id}"));
        let sha = self
            .backend
            .put(&path, &encode_json(&record)?, &message, None)
            .await?;
        record.sha = Some(sha);

        let archive_path = self.paths.archive(contact_id, &original_id);
        let message = self.commit_message(&format!("remove archive {deleted_id}"));
        if let Err(source) = self.backend.delete(&archive_path, &archive_sha, &message).await {
            error!("note {original_id} restored but archive {archive_path} remains: {source}");
            return Err(NotesError::OrphanedArchive {
                session_key: original_id,
                archive_path,
                source,
            });
        }

        let entry = CommunicationEntry {
            id: original_id.clone(),
            file_path: path,
            timestamp: now,
            summary: record.summary.clone(),
        };
        self.update_manifest(contact_id, |m| m.record_restore(deleted_id, entry))
            .await
            .map_err(|source| {
                error!("note {original_id} restored but manifest update failed: {source}");
                NotesError::ManifestUpdate {
                    contact_id: contact_id.to_string(),
                    source: Box::new(source),
                }
            })?;

        info!("restored note {original_id} for contact {contact_id}");
        Ok(record)
    }

    // ── Repair ──

    /// Rebuilds the contact's manifest from the files actually in storage.
    ///
    /// Drops entries whose files are gone and indexes unlisted files. An
    /// archive whose original is still live is reported, not indexed.
    pub async fn repair_manifest(&self, contact_id: &str) -> NotesResult<RepairReport> {
        paths::validate_segment("contact id", contact_id)?;

        let mut live = BTreeSet::new();
        let mut archived = BTreeSet::new();
        for file in self.backend.list(&self.paths.notes_dir(contact_id)).await? {
            match NotePaths::classify(&file) {
                NoteFile::Live(id) => {
                    live.insert(id);
                }
                NoteFile::Archive(id) => {
                    archived.insert(id);
                }
                NoteFile::Manifest | NoteFile::Other => {}
            }
        }

        let manifest_path = self.paths.manifest(contact_id);
        let _guard = self.manifest_locks.lock(&manifest_path).await;
        let (mut manifest, version) = self.load_manifest(contact_id).await?;

        let mut report = RepairReport::default();
        let (removed_live, removed_deleted) = manifest.prune_missing(&live, &archived);
        report.removed_communications = removed_live;
        report.removed_deleted = removed_deleted;

        for id in manifest.unindexed_live(&live) {
            if manifest.is_archived(&id) {
                warn!("live note {id} is also indexed as archived");
                report.orphaned_archives.push(paths::deleted_id(&id));
                continue;
            }
            let path = self.paths.note(contact_id, &id);
            let Some((record, _)) = self.read_json::<NoteRecord>(&path).await? else {
                continue;
            };
            manifest.upsert_communication(CommunicationEntry {
                id: id.clone(),
                file_path: path,
                timestamp: record.updated_at,
                summary: record.summary,
            });
            report.added_communications.push(id);
        }

        for original_id in manifest.unindexed_archives(&archived) {
            let deleted_id = paths::deleted_id(&original_id);
            if live.contains(&original_id) {
                warn!("archive {deleted_id} duplicates live note {original_id}");
                report.orphaned_archives.push(deleted_id);
                continue;
            }
            let (_, wrapper, archived_sha) =
                self.open_archive(contact_id, &original_id, &deleted_id).await?;
            let meta = wrapper.deleted_meta;
            manifest.record_archive(DeletedNoteEntry {
                id: deleted_id.clone(),
                file_path: self.paths.archive(contact_id, &original_id),
                original_id,
                deleted_at: meta.deleted_at,
                deleted_by: meta.deleted_by,
                archived_sha,
                summary: meta.summary.unwrap_or_default(),
            });
            report.added_deleted.push(deleted_id);
        }

        if report.changed_manifest() {
            self.save_manifest(contact_id, &manifest, version.as_deref()).await?;
            info!(
                "repaired manifest for contact {contact_id}: +{} -{} live, +{} -{} archived",
                report.added_communications.len(),
                report.removed_communications.len(),
                report.added_deleted.len(),
                report.removed_deleted.len()
            );
        }
        Ok(report)
    }

    // ── Internals ──

    fn commit_message(&self, action: &str) -> String {
        format!("{}: {action}", self.config.commit_prefix)
    }

    fn original_id_of(&self, contact_id: &str, deleted_id: &str) -> NotesResult<String> {
        paths::validate_segment("contact id", contact_id)?;
        paths::validate_segment("deleted note id", deleted_id)?;
        deleted_id
            .strip_prefix(paths::DELETED_PREFIX)
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
            .ok_or_else(|| NotesError::InvalidId(format!("deleted note id {deleted_id:?}")))
    }

    /// Reads an archive file and decrypts its outer wrapper.
    async fn open_archive(
        &self,
        contact_id: &str,
        original_id: &str,
        deleted_id: &str,
    ) -> NotesResult<(ArchivedNoteFile, DeletedNoteWrapper, String)> {
        let archive_path = self.paths.archive(contact_id, original_id);
        let (file, sha) = self
            .read_json::<ArchivedNoteFile>(&archive_path)
            .await?
            .ok_or_else(|| NotesError::NoteNotFound(deleted_id.to_string()))?;
        let wrapper: DeletedNoteWrapper = self.session.decrypt_object(&file.payload)?;
        Ok((file, wrapper, sha))
    }

    /// Writes the archive slot, overwriting a leftover from an earlier
    /// partial failure if there is one.
    async fn write_archive(
        &self,
        archive_path: &str,
        body: &str,
        session_key: &str,
    ) -> Result<String, BackendError> {
        let existing = match self.backend.get(archive_path).await {
            Ok(file) => Some(file.version),
            Err(BackendError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        if existing.is_some() {
            warn!("overwriting stale archive slot {archive_path}");
        }
        let message = self.commit_message(&format!("archive note {session_key}"));
        self.backend
            .put(archive_path, body, &message, existing.as_deref())
            .await
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &str) -> NotesResult<Option<(T, String)>> {
        match self.backend.get(path).await {
            Ok(file) => Ok(Some((decode_json(&file.content)?, file.version))),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_manifest(&self, contact_id: &str) -> NotesResult<(Manifest, Option<String>)> {
        let path = self.paths.manifest(contact_id);
        Ok(match self.read_json::<Manifest>(&path).await? {
            Some((manifest, version)) => (manifest, Some(version)),
            None => (Manifest::default(), None),
        })
    }

    async fn save_manifest(
        &self,
        contact_id: &str,
        manifest: &Manifest,
        version: Option<&str>,
    ) -> NotesResult<String> {
        let path = self.paths.manifest(contact_id);
        let message = self.commit_message(&format!("update manifest for contact {contact_id}"));
        Ok(self
            .backend
            .put(&path, &encode_json(manifest)?, &message, version)
            .await?)
    }

    /// Read-modify-write of the manifest, serialized per contact.
    async fn update_manifest<R>(
        &self,
        contact_id: &str,
        mutate: impl FnOnce(&mut Manifest) -> R,
    ) -> NotesResult<R> {
        let _guard = self.manifest_locks.lock(&self.paths.manifest(contact_id)).await;
        let (mut manifest, version) = self.load_manifest(contact_id).await?;
        let out = mutate(&mut manifest);
        self.save_manifest(contact_id, &manifest, version.as_deref()).await?;
        Ok(out)
    }
}

fn encode_json<T: Serialize + ?Sized>(value: &T) -> NotesResult<String> {
    Ok(STANDARD.encode(serde_json::to_vec(value)?))
}

fn decode_json<T: DeserializeOwned>(content: &str) -> NotesResult<T> {
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| NotesError::Encoding(e.to_string()))?;
    Ok(serde_json::from_slice(&bytes)?)
}
