//! Notes storage configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the notes store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotesConfig {
    /// Repository directory that holds the `contact-*` folders.
    pub base_path: String,

    /// Prefix for commit messages written by the store.
    pub commit_prefix: String,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            base_path: "data".to_string(),
            commit_prefix: "notes".to_string(),
        }
    }
}
