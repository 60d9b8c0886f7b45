//! Stored and returned note shapes.

use chrono::{DateTime, Utc};
use repocrm_session::EncryptedBlob;
use serde::{Deserialize, Serialize};

/// A live note file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    /// `{contactId}_{dateId}`.
    pub id: String,
    pub contact_id: String,
    pub content: EncryptedBlob,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: String,
    /// Backend version token of this file. Filled in after every read or
    /// write and never written into the file itself.
    #[serde(rename = "_sha", default, skip_serializing)]
    pub sha: Option<String>,
}

/// Audit data kept with an archived note.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedMeta {
    pub deleted_by: String,
    pub deleted_at: DateTime<Utc>,
    pub original_path: String,
    pub original_sha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_author: Option<String>,
    /// Manifest summary at archive time, so a rebuilt index can restore it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Plaintext form of an archive payload.
///
/// `archived_content` is the live note's ciphertext, copied verbatim.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedNoteWrapper {
    pub deleted_meta: DeletedMeta,
    pub archived_content: EncryptedBlob,
}

/// An archive file: ids in the clear, everything else encrypted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedNoteFile {
    pub id: String,
    pub original_id: String,
    /// Encrypted [`DeletedNoteWrapper`].
    pub payload: EncryptedBlob,
}

/// A note with its content decrypted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedNote {
    pub id: String,
    pub contact_id: String,
    pub content: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: String,
    #[serde(rename = "_sha")]
    pub sha: String,
}

/// Recovered body of an archived note.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArchivedContent {
    /// The inner payload decrypted to a JSON object or array.
    Structured(serde_json::Value),
    /// Anything else, returned as the raw decrypted string.
    Text(String),
}

impl ArchivedContent {
    pub(crate) fn from_plaintext(plaintext: String) -> Self {
        match serde_json::from_str::<serde_json::Value>(&plaintext) {
            Ok(value) if value.is_object() || value.is_array() => ArchivedContent::Structured(value),
            _ => ArchivedContent::Text(plaintext),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArchivedContent::Text(s) => Some(s),
            ArchivedContent::Structured(_) => None,
        }
    }
}

/// An archived note opened for inspection.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedDeletedNote {
    pub id: String,
    pub original_id: String,
    pub deleted_meta: DeletedMeta,
    pub original_note: ArchivedContent,
}

/// Outcome of a manifest repair scan.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairReport {
    pub added_communications: Vec<String>,
    pub removed_communications: Vec<String>,
    pub added_deleted: Vec<String>,
    pub removed_deleted: Vec<String>,
    /// Archives whose original note still exists. Left for an operator.
    pub orphaned_archives: Vec<String>,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.added_communications.is_empty()
            && self.removed_communications.is_empty()
            && self.added_deleted.is_empty()
            && self.removed_deleted.is_empty()
            && self.orphaned_archives.is_empty()
    }

    pub(crate) fn changed_manifest(&self) -> bool {
        !(self.added_communications.is_empty()
            && self.removed_communications.is_empty()
            && self.added_deleted.is_empty()
            && self.removed_deleted.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha_is_read_but_never_written() {
        let json = serde_json::json!({
            "id": "42_a",
            "contactId": "42",
            "content": "AAAA",
            "summary": "s",
            "createdAt": "2025-01-01T12:00:00Z",
            "updatedAt": "2025-01-01T12:00:00Z",
            "author": "a@b.com",
            "_sha": "abc"
        });
        let record: NoteRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.sha.as_deref(), Some("abc"));

        let written = serde_json::to_value(&record).unwrap();
        assert!(written.get("_sha").is_none());
    }

    #[test]
    fn plain_text_archive_content_stays_text() {
        let c = ArchivedContent::from_plaintext("note body".into());
        assert_eq!(c.as_text(), Some("note body"));
    }

    #[test]
    fn scalar_json_archive_content_stays_text() {
        let c = ArchivedContent::from_plaintext("42".into());
        assert_eq!(c, ArchivedContent::Text("42".into()));
    }

    #[test]
    fn object_archive_content_is_structured() {
        let c = ArchivedContent::from_plaintext(r#"{"body":"hi"}"#.into());
        assert_eq!(c, ArchivedContent::Structured(serde_json::json!({"body": "hi"})));
    }
}
