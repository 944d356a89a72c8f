//! Process-local store with the same conditional-write contract as GitHub.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Fetched, RecordStore, StoreError, VersionToken};

#[derive(Debug, Clone)]
struct Entry {
    content: String,
    revision: u64,
}

/// In-memory [`RecordStore`]. Versions are per-path revision counters.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file, bumping its revision.
    pub async fn insert(&self, path: &str, content: impl Into<String>) -> VersionToken {
        let mut files = self.files.lock().await;
        let revision = files.get(path).map_or(1, |e| e.revision + 1);
        files.insert(
            path.to_string(),
            Entry {
                content: content.into(),
                revision,
            },
        );
        token(revision)
    }

    /// Current content of `path`, if any.
    pub async fn content(&self, path: &str) -> Option<String> {
        self.files.lock().await.get(path).map(|e| e.content.clone())
    }
}

fn token(revision: u64) -> VersionToken {
    VersionToken::new(format!("rev-{revision}"))
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch(&self, path: &str) -> Result<Fetched, StoreError> {
        let files = self.files.lock().await;
        Ok(match files.get(path) {
            Some(entry) => Fetched::Found {
                content: entry.content.clone(),
                version: token(entry.revision),
            },
            None => Fetched::Missing,
        })
    }

    async fn write(
        &self,
        path: &str,
        content: &str,
        version: Option<&VersionToken>,
    ) -> Result<VersionToken, StoreError> {
        let mut files = self.files.lock().await;
        let current = files.get(path).map(|e| token(e.revision));
        if current.as_ref() != version {
            return Err(StoreError::Conflict {
                path: path.to_string(),
            });
        }
        let revision = files.get(path).map_or(1, |e| e.revision + 1);
        files.insert(
            path.to_string(),
            Entry {
                content: content.to_string(),
                revision,
            },
        );
        Ok(token(revision))
    }
}
