//! GitHub Contents API store.
//!
//! Each kind's CSV lives as a regular file in a repository branch:
//!
//! ```text
//! GET {api}/repos/{owner}/{repo}/contents/{path}?ref={branch}   -> { sha, content(base64) }
//! PUT {api}/repos/{owner}/{repo}/contents/{path}                <- { message, content, branch, sha? }
//! ```
//!
//! The blob `sha` is the version token. GitHub answers a stale `sha` with
//! 409, and a create without `sha` for a path that already exists with 422.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};

use super::{Fetched, RecordStore, StoreError, VersionToken};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const CLIENT_USER_AGENT: &str = "wds-signups";

/// Connection parameters for [`GitHubContentsStore`].
#[derive(Clone)]
pub struct GitHubConfig {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: String,
    /// Token with `contents: read/write` on the repository.
    pub token: Option<String>,
    pub api_base: String,
    /// Upper bound for every request, connect to last byte.
    pub timeout: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            owner: None,
            repo: None,
            branch: DEFAULT_BRANCH.to_string(),
            token: None,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn present(value: Option<&String>) -> Option<&str> {
    value
        .map(String::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl GitHubConfig {
    /// Names of the required parameters that are absent or blank.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if present(self.owner.as_ref()).is_none() {
            missing.push("owner");
        }
        if present(self.repo.as_ref()).is_none() {
            missing.push("repo");
        }
        if present(self.token.as_ref()).is_none() {
            missing.push("token");
        }
        missing
    }

    pub fn is_configured(&self) -> bool {
        self.missing().is_empty()
    }

    pub fn has_token(&self) -> bool {
        present(self.token.as_ref()).is_some()
    }
}

/// Resolved coordinates for a request.
struct Target<'a> {
    owner: &'a str,
    repo: &'a str,
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: String,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: PutContentsFile,
}

#[derive(Debug, Deserialize)]
struct PutContentsFile {
    sha: String,
}

/// [`RecordStore`] backed by the GitHub Contents API.
pub struct GitHubContentsStore {
    client: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubContentsStore {
    pub fn new(config: GitHubConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create a store with a custom HTTP client.
    pub fn with_client(client: reqwest::Client, config: GitHubConfig) -> Self {
        Self { client, config }
    }

    fn target(&self) -> Result<Target<'_>, StoreError> {
        match (
            present(self.config.owner.as_ref()),
            present(self.config.repo.as_ref()),
            present(self.config.token.as_ref()),
        ) {
            (Some(owner), Some(repo), Some(token)) => Ok(Target { owner, repo, token }),
            _ => Err(StoreError::NotConfigured {
                missing: self.config.missing(),
            }),
        }
    }

    fn contents_url(&self, target: &Target<'_>, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.config.api_base.trim_end_matches('/'),
            target.owner,
            target.repo,
            path.trim_start_matches('/'),
        )
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        target: &Target<'_>,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .timeout(self.config.timeout)
            .header(AUTHORIZATION, format!("Bearer {}", target.token))
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(ACCEPT, GITHUB_ACCEPT)
    }
}

fn send_error(err: reqwest::Error) -> StoreError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    StoreError::Transient {
        status: err.status().map(|status| status.as_u16()),
        message,
    }
}

fn status_error(status: StatusCode, body: String) -> StoreError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        StoreError::Transient {
            status: Some(status.as_u16()),
            message: format!("HTTP {status}: {body}"),
        }
    } else {
        StoreError::Rejected {
            status: status.as_u16(),
            message: body,
        }
    }
}

fn decode_content(meta: ContentsResponse) -> Result<Fetched, StoreError> {
    let encoded = meta.content.unwrap_or_default();
    if encoded.is_empty() && meta.encoding.as_deref() == Some("none") {
        return Err(StoreError::Decode(
            "file too large for the contents API".to_string(),
        ));
    }
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| StoreError::Decode(format!("base64: {e}")))?;
    let content =
        String::from_utf8(bytes).map_err(|e| StoreError::Decode(format!("utf-8: {e}")))?;
    Ok(Fetched::Found {
        content,
        version: VersionToken::new(meta.sha),
    })
}

#[async_trait]
impl RecordStore for GitHubContentsStore {
    async fn fetch(&self, path: &str) -> Result<Fetched, StoreError> {
        let target = self.target()?;
        let url = self.contents_url(&target, path);
        tracing::debug!(%url, branch = %self.config.branch, "GitHub GET");

        let response = self
            .request(reqwest::Method::GET, &url, &target)
            .query(&[("ref", self.config.branch.as_str())])
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Fetched::Missing);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let meta = response
            .json::<ContentsResponse>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        decode_content(meta)
    }

    async fn write(
        &self,
        path: &str,
        content: &str,
        version: Option<&VersionToken>,
    ) -> Result<VersionToken, StoreError> {
        let target = self.target()?;
        let url = self.contents_url(&target, path);
        let body = PutContentsRequest {
            message: format!("chore: append {path} [bot]"),
            content: STANDARD.encode(content),
            branch: &self.config.branch,
            sha: version.map(VersionToken::as_str),
        };
        tracing::debug!(%url, creating = version.is_none(), "GitHub PUT");

        let response = self
            .request(reqwest::Method::PUT, &url, &target)
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status();
        let conflict = status == StatusCode::CONFLICT
            || (status == StatusCode::UNPROCESSABLE_ENTITY && version.is_none());
        if conflict {
            return Err(StoreError::Conflict {
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let written = response
            .json::<PutContentsResponse>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(VersionToken::new(written.content.sha))
    }
}
