//! GitHub backend setup errors.
//!
//! Request failures are reported as `BackendError` through the storage
//! trait; these only cover building the client.

use thiserror::Error;

pub type GitHubResult<T> = Result<T, GitHubError>;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
