//! Record store: whole-file reads and conditional whole-file writes.
//!
//! The store is addressed by path and versioned by an opaque token. A write
//! carries the token the content was read with; a stale token is rejected as
//! [`StoreError::Conflict`] so callers can re-read and retry.

mod github;
mod memory;

pub use github::{
    DEFAULT_API_BASE, DEFAULT_BRANCH, DEFAULT_TIMEOUT, GitHubConfig, GitHubContentsStore,
};
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque revision identifier returned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of [`RecordStore::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Missing,
    Found {
        content: String,
        version: VersionToken,
    },
}

/// Errors from a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection parameters are absent.
    #[error("store not configured (missing {})", missing.join(", "))]
    NotConfigured { missing: Vec<&'static str> },

    /// Network failure, timeout, or a server-side (5xx/429) response.
    #[error("transient store error: {message}")]
    Transient {
        status: Option<u16>,
        message: String,
    },

    /// The file changed since the presented version was read.
    #[error("version conflict writing {path}")]
    Conflict { path: String },

    /// Any other non-success response.
    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response could not be decoded.
    #[error("could not decode store response: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// A file store with optimistic concurrency control.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the whole file at `path`.
    async fn fetch(&self, path: &str) -> Result<Fetched, StoreError>;

    /// Replace the whole file at `path`.
    ///
    /// `version` must be the token the caller last read, or `None` when
    /// creating the file. Returns the new version.
    async fn write(
        &self,
        path: &str,
        content: &str,
        version: Option<&VersionToken>,
    ) -> Result<VersionToken, StoreError>;
}
