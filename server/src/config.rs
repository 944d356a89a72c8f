//! Layered server configuration.
//!
//! Precedence, lowest to highest: built-in defaults, the TOML file, the
//! environment, then command-line flags (applied by the binary).
//!
//! ```toml
//! bind = "0.0.0.0:3000"
//! admin_key = "s3cret"
//! backend = "github"
//!
//! [github]
//! owner = "acme"
//! repo = "site"
//! branch = "main"
//! timeout_secs = 10
//!
//! [paths]
//! waitlist = "data/waitlist.csv"
//! sponsor = "data/sponsors.csv"
//!
//! [retry]
//! max_attempts = 3
//! backoff_ms = 100
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use wds_signups::{
    GitHubConfig, GitHubContentsStore, KindPaths, MemoryStore, RecordStore, RetryPolicy, Signups,
};

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const CONFIG_PATH_VAR: &str = "WDS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parsing error in {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for ${var}: '{value}' (expected: {expected})")]
    InvalidEnvValue {
        var: String,
        value: String,
        expected: String,
    },

    #[error("Invalid value for `{field}`: '{value}' (expected: {expected})")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Where records are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// CSV files in a GitHub repository.
    #[default]
    Github,
    /// Process memory; contents are lost on exit.
    Memory,
}

impl Backend {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "github" => Some(Self::Github),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    bind: Option<String>,
    admin_key: Option<String>,
    backend: Option<Backend>,
    github: GitHubSection,
    paths: Option<KindPaths>,
    retry: RetrySection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GitHubSection {
    owner: Option<String>,
    repo: Option<String>,
    branch: Option<String>,
    token: Option<String>,
    api_base: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RetrySection {
    max_attempts: Option<u32>,
    backoff_ms: Option<u64>,
}

/// Fully resolved server settings.
#[derive(Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub admin_key: Option<String>,
    pub backend: Backend,
    pub github: GitHubConfig,
    pub paths: KindPaths,
    pub retry: RetryPolicy,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("admin_key", &self.admin_key.as_ref().map(|_| "<redacted>"))
            .field("backend", &self.backend)
            .field("github", &self.github)
            .field("paths", &self.paths)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            admin_key: None,
            backend: Backend::default(),
            github: GitHubConfig::default(),
            paths: KindPaths::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, then `file` (if any), then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = file {
            config.apply_file(path)?;
        }
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Overlay values from a TOML file.
    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        self.merge(file)
    }

    fn merge(&mut self, file: FileConfig) -> Result<(), ConfigError> {
        if let Some(bind) = file.bind {
            self.bind = bind.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "bind",
                value: bind,
                expected: "a socket address such as 127.0.0.1:3000",
            })?;
        }
        if let Some(key) = non_blank(file.admin_key) {
            self.admin_key = Some(key);
        }
        if let Some(backend) = file.backend {
            self.backend = backend;
        }

        let github = file.github;
        if let Some(owner) = non_blank(github.owner) {
            self.github.owner = Some(owner);
        }
        if let Some(repo) = non_blank(github.repo) {
            self.github.repo = Some(repo);
        }
        if let Some(branch) = non_blank(github.branch) {
            self.github.branch = branch;
        }
        if let Some(token) = non_blank(github.token) {
            self.github.token = Some(token);
        }
        if let Some(api_base) = non_blank(github.api_base) {
            self.github.api_base = api_base;
        }
        if let Some(secs) = github.timeout_secs {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "github.timeout_secs",
                    value: secs.to_string(),
                    expected: "a positive number of seconds",
                });
            }
            self.github.timeout = Duration::from_secs(secs);
        }

        if let Some(paths) = file.paths {
            self.paths = paths;
        }
        if let Some(max_attempts) = file.retry.max_attempts {
            if max_attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "retry.max_attempts",
                    value: max_attempts.to_string(),
                    expected: "at least 1",
                });
            }
            self.retry.max_attempts = max_attempts;
        }
        if let Some(backoff_ms) = file.retry.backoff_ms {
            self.retry.initial_backoff_ms = backoff_ms;
        }
        Ok(())
    }

    /// Overlay values from environment variables read through `lookup`.
    ///
    /// `GITHUB_*` names win over their `VERCEL_*` fallbacks; blank values are
    /// treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |names: &[&'static str]| -> Option<(&'static str, String)> {
            names.iter().find_map(|name| {
                let value = lookup(name)?;
                let value = value.trim();
                (!value.is_empty()).then(|| (*name, value.to_string()))
            })
        };

        if let Some((_, owner)) = var(&["GITHUB_OWNER", "VERCEL_GIT_REPO_OWNER"]) {
            self.github.owner = Some(owner);
        }
        if let Some((_, repo)) = var(&["GITHUB_REPO", "VERCEL_GIT_REPO_SLUG"]) {
            self.github.repo = Some(repo);
        }
        if let Some((_, branch)) = var(&["GITHUB_BRANCH", "VERCEL_GIT_COMMIT_REF"]) {
            self.github.branch = branch;
        }
        if let Some((_, token)) = var(&["GITHUB_TOKEN"]) {
            self.github.token = Some(token);
        }
        if let Some((_, api_base)) = var(&["GITHUB_API_URL"]) {
            self.github.api_base = api_base;
        }
        if let Some((name, value)) = var(&["GITHUB_TIMEOUT_SECS"]) {
            match value.parse::<u64>() {
                Ok(secs) if secs > 0 => self.github.timeout = Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidEnvValue {
                        var: name.to_string(),
                        value,
                        expected: "a positive number of seconds".to_string(),
                    });
                }
            }
        }
        if let Some((_, key)) = var(&["ADMIN_KEY"]) {
            self.admin_key = Some(key);
        }
        if let Some((name, value)) = var(&["WDS_BIND"]) {
            self.bind = value
                .parse()
                .map_err(|_| ConfigError::InvalidEnvValue {
                    var: name.to_string(),
                    value,
                    expected: "a socket address such as 127.0.0.1:3000".to_string(),
                })?;
        }
        if let Some((name, value)) = var(&["WDS_STORE_BACKEND"]) {
            self.backend =
                Backend::parse(&value).ok_or_else(|| ConfigError::InvalidEnvValue {
                    var: name.to_string(),
                    value,
                    expected: "github or memory".to_string(),
                })?;
        }
        Ok(())
    }

    /// Build the signups service over the configured backend.
    pub fn build_signups(&self) -> Signups {
        let store: Arc<dyn RecordStore> = match self.backend {
            Backend::Github => {
                let missing = self.github.missing();
                if !missing.is_empty() {
                    tracing::warn!(
                        missing = %missing.join(", "),
                        "GitHub store is not fully configured; requests will fail"
                    );
                }
                Arc::new(GitHubContentsStore::new(self.github.clone()))
            }
            Backend::Memory => {
                tracing::warn!("using in-memory store; records are lost on exit");
                Arc::new(MemoryStore::new())
            }
        };
        Signups::new(store)
            .with_paths(self.paths.clone())
            .with_retry(self.retry.clone())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
