//! GitHub repository storage for repocrm notes.
//!
//! [`GitHubContentsBackend`] implements the notes store's versioned file
//! seam on top of the REST contents API, using blob SHAs as version tokens.

pub mod config;
pub mod contents_client;
pub mod error;

pub use config::GitHubConfig;
pub use contents_client::GitHubContentsBackend;
pub use error::{GitHubError, GitHubResult};
