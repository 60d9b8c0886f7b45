//! GitHub backend configuration.

use serde::{Deserialize, Serialize};

/// Where and how to reach the repository that stores CRM data.
#[derive(Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// REST API root. Point at `https://{host}/api/v3` for GitHub Enterprise.
    pub api_base_url: String,

    pub owner: String,
    pub repo: String,

    /// Branch that reads and commits go to.
    pub branch: String,

    /// Personal access or installation token. Requests are anonymous without one.
    #[serde(default)]
    pub token: Option<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            owner: String::new(),
            repo: String::new(),
            branch: "main".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_base_url", &self.api_base_url)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
