//! `wds-signups` — waitlist and sponsor signups stored as CSV files in a
//! GitHub repository.
//!
//! The repository is the database: each kind has one header-led CSV file,
//! read and replaced whole through the Contents API. Appends are guarded by
//! the file's version token and retried on conflict; reads redact the
//! retired `ua`/`ip` columns.
//!
//! ```no_run
//! # async fn demo() -> Result<(), wds_signups::SignupError> {
//! use std::sync::Arc;
//! use wds_signups::{GitHubConfig, GitHubContentsStore, Signups};
//!
//! let store = GitHubContentsStore::new(GitHubConfig {
//!     owner: Some("acme".into()),
//!     repo: Some("site".into()),
//!     token: Some("ghp_…".into()),
//!     ..GitHubConfig::default()
//! });
//! let signups = Signups::new(Arc::new(store));
//! signups
//!     .submit("waitlist", &serde_json::json!({"name": "Jo", "email": "jo@x.com"}))
//!     .await?;
//! let table = signups.list("waitlist").await?;
//! println!("{}", table.to_csv());
//! # Ok(())
//! # }
//! ```

pub mod append;
pub mod csv;
mod error;
pub mod kind;
mod legacy;
pub mod list;
pub mod store;
pub mod submission;

use std::sync::Arc;

use serde_json::{Map, Value};

pub use append::{RetryPolicy, Submitted};
pub use error::{ErrorClass, SignupError};
pub use kind::{KindPaths, RecordKind};
pub use list::{Row, Table};
pub use store::{
    Fetched, GitHubConfig, GitHubContentsStore, MemoryStore, RecordStore, StoreError,
    VersionToken,
};
pub use submission::{Payload, ValidatedRecord};

/// Submit and list operations over one record store.
#[derive(Clone)]
pub struct Signups {
    store: Arc<dyn RecordStore>,
    paths: KindPaths,
    retry: RetryPolicy,
}

impl Signups {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            paths: KindPaths::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_paths(mut self, paths: KindPaths) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn path_for(&self, kind: RecordKind) -> &str {
        self.paths.path_for(kind)
    }

    /// Submit a raw request body (`{kind, data}` and the legacy shapes).
    pub async fn submit_payload(&self, body: &Value) -> Result<Submitted, SignupError> {
        let payload = submission::normalize_payload(body)?;
        let kind = parse_kind(&payload.kind)?;
        self.submit_kind(kind, &payload.data).await
    }

    /// Submit `fields` (a JSON object) for a kind given by name.
    pub async fn submit(&self, kind: &str, fields: &Value) -> Result<Submitted, SignupError> {
        let kind = parse_kind(kind)?;
        let Some(fields) = fields.as_object() else {
            return Err(SignupError::BadPayload("data must be an object".to_string()));
        };
        self.submit_kind(kind, fields).await
    }

    pub async fn submit_kind(
        &self,
        kind: RecordKind,
        fields: &Map<String, Value>,
    ) -> Result<Submitted, SignupError> {
        if submission::is_honeypot(fields) {
            tracing::debug!(%kind, "honeypot tripped, dropping submission");
            return Ok(Submitted {
                bot: true,
                attempts: 0,
            });
        }

        let record = ValidatedRecord::from_fields(kind, fields)?;
        let attempts =
            append::append_record(self.store.as_ref(), self.path_for(kind), &record, &self.retry)
                .await?;
        Ok(Submitted {
            bot: false,
            attempts,
        })
    }

    pub async fn list(&self, kind: &str) -> Result<Table, SignupError> {
        self.list_kind(parse_kind(kind)?).await
    }

    pub async fn list_kind(&self, kind: RecordKind) -> Result<Table, SignupError> {
        list::list_records(self.store.as_ref(), self.path_for(kind), kind).await
    }
}

fn parse_kind(raw: &str) -> Result<RecordKind, SignupError> {
    RecordKind::parse(raw).ok_or_else(|| SignupError::UnknownKind(raw.trim().to_string()))
}
