//! Versioned file storage over the GitHub repository contents API.
//!
//! Each file's blob SHA is its version token. GitHub rejects a write with a
//! stale or missing SHA with 409 or 422, which surfaces as
//! `BackendError::Conflict`. Requests are never retried here.

use crate::config::GitHubConfig;
use crate::error::{GitHubError, GitHubResult};
use async_trait::async_trait;
use repocrm_notes::{BackendError, StoredFile, VersionedFileBackend};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const API_VERSION: &str = "2022-11-28";

#[derive(Deserialize)]
struct ContentFile {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    sha: String,
}

#[derive(Deserialize)]
struct DirEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    content: CommitContent,
}

#[derive(Deserialize)]
struct CommitContent {
    sha: String,
}

#[derive(Serialize)]
struct PutBody<'a> {
    message: &'a str,
    content: &'a str,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Serialize)]
struct DeleteBody<'a> {
    message: &'a str,
    sha: &'a str,
    branch: &'a str,
}

/// [`VersionedFileBackend`] backed by one GitHub repository branch.
pub struct GitHubContentsBackend {
    client: Client,
    config: GitHubConfig,
    contents_url: Url,
}

impl GitHubContentsBackend {
    pub fn new(config: GitHubConfig) -> GitHubResult<Self> {
        if config.owner.is_empty() || config.repo.is_empty() {
            return Err(GitHubError::Config("owner and repo are required".into()));
        }

        let mut contents_url = Url::parse(&config.api_base_url)
            .map_err(|e| GitHubError::Config(format!("api_base_url: {e}")))?;
        contents_url
            .path_segments_mut()
            .map_err(|_| GitHubError::Config("api_base_url cannot be a base".into()))?
            .pop_if_empty()
            .extend(["repos", config.owner.as_str(), config.repo.as_str(), "contents"]);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("repocrm-notes"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            config,
            contents_url,
        })
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    fn url_for(&self, path: &str) -> Url {
        let mut url = self.contents_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn fetch(&self, path: &str) -> Result<Response, BackendError> {
        let mut url = self.url_for(path);
        url.query_pairs_mut().append_pair("ref", &self.config.branch);
        debug!("GET contents {path}");
        let resp = self
            .authed(self.client.get(url))
            .send()
            .await
            .map_err(transport)?;
        check(resp, path).await
    }
}

#[async_trait]
impl VersionedFileBackend for GitHubContentsBackend {
    async fn get(&self, path: &str) -> Result<StoredFile, BackendError> {
        let file: ContentFile = decode(self.fetch(path).await?, path).await?;
        if file.kind != "file" {
            return Err(BackendError::InvalidResponse(format!(
                "{path} is a {}, not a file",
                file.kind
            )));
        }
        // Files over 1 MiB come back without a body.
        if file.encoding.as_deref() == Some("none") {
            return Err(BackendError::InvalidResponse(format!(
                "{path} is too large for the contents API"
            )));
        }
        // The API wraps base64 bodies at 60 columns.
        let content: String = file
            .content
            .unwrap_or_default()
            .split_whitespace()
            .collect();
        Ok(StoredFile {
            content,
            version: file.sha,
        })
    }

    async fn put(
        &self,
        path: &str,
        content: &str,
        message: &str,
        version: Option<&str>,
    ) -> Result<String, BackendError> {
        let body = PutBody {
            message,
            content,
            branch: &self.config.branch,
            sha: version,
        };
        debug!(
            "PUT contents {path} ({})",
            if version.is_some() { "update" } else { "create" }
        );
        let resp = self
            .authed(self.client.put(self.url_for(path)))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let commit: CommitResponse = decode(check(resp, path).await?, path).await?;
        Ok(commit.content.sha)
    }

    async fn delete(&self, path: &str, version: &str, message: &str) -> Result<(), BackendError> {
        let body = DeleteBody {
            message,
            sha: version,
            branch: &self.config.branch,
        };
        debug!("DELETE contents {path}");
        let resp = self
            .authed(self.client.delete(self.url_for(path)))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        check(resp, path).await?;
        Ok(())
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>, BackendError> {
        let resp = match self.fetch(dir).await {
            Ok(resp) => resp,
            Err(BackendError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let entries: Vec<DirEntry> = decode(resp, dir).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.kind == "file")
            .map(|e| e.path)
            .collect())
    }
}

fn transport(err: reqwest::Error) -> BackendError {
    BackendError::Unavailable(err.to_string())
}

async fn check(resp: Response, path: &str) -> Result<Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status {
        StatusCode::NOT_FOUND => Err(BackendError::NotFound(path.to_string())),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            debug!("{status} on {path}: stale or missing sha");
            Err(BackendError::Conflict(path.to_string()))
        }
        _ => {
            let detail = resp.text().await.unwrap_or_default();
            warn!("contents API returned {status} for {path}");
            Err(BackendError::Unavailable(format!("{status} on {path}: {detail}")))
        }
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: Response, path: &str) -> Result<T, BackendError> {
    resp.json()
        .await
        .map_err(|e| BackendError::InvalidResponse(format!("{path}: {e}")))
}
