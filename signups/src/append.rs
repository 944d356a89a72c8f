//! Append path: read latest, merge header, serialize, conditional write.
//!
//! The store has no append primitive, so each append rewrites the whole file
//! with the version it read. Losing a race surfaces as a conflict; the loop
//! re-reads and tries again, up to [`RetryPolicy::max_attempts`].
//!
//! ```text
//! Fetching ──ok──▶ Writing ──ok──▶ Done
//!    │               │
//!    │ err           ├─conflict─▶ Conflicted ──attempts left──▶ Fetching
//!    ▼               │ err              │
//! Failed ◀───────────┘                  └──exhausted──▶ Failed(WriteConflict)
//! ```

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde::Serialize;

use crate::csv;
use crate::error::SignupError;
use crate::kind::{RecordKind, TIMESTAMP_COLUMN};
use crate::legacy;
use crate::store::{Fetched, RecordStore, VersionToken};
use crate::submission::ValidatedRecord;

/// Bounded retry with jittered exponential backoff between conflicts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Relative jitter applied to each sleep (0.5 → ±50%).
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.5,
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget, no sleeping between attempts.
    pub fn immediate() -> Self {
        Self {
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            jitter_factor: 0.0,
            ..Self::default()
        }
    }

    /// Sleep before the attempt following `attempt` (1-indexed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let base = (self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent))
            .min(self.max_backoff_ms as f64);
        apply_jitter(Duration::from_millis(base as u64), self.jitter_factor)
    }
}

fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if duration.is_zero() || jitter_factor <= 0.0 {
        return duration;
    }
    let jitter = rand::rng().random_range(-jitter_factor..=jitter_factor);
    let jittered_ms = (duration.as_millis() as f64 * (1.0 + jitter)).max(0.0) as u64;
    Duration::from_millis(jittered_ms)
}

/// Result of a successful submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Submitted {
    /// The honeypot tripped; nothing was stored.
    pub bot: bool,
    /// Write attempts used (0 for bot submissions).
    pub attempts: u32,
}

/// Current ISO-8601 UTC timestamp with millisecond precision.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Content to write and the version to present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NextWrite {
    pub content: String,
    pub version: Option<VersionToken>,
}

/// A header change decided by [`reconcile_columns`].
#[derive(Debug, PartialEq, Eq)]
struct Reconciled {
    columns: Vec<String>,
    /// Set when legacy rows must be cut to this many fields so their
    /// `ua,ip` values cannot line up under newly appended columns.
    truncate_rows_to: Option<usize>,
}

/// Columns the header should carry, or `None` when it already fits.
///
/// Trailing `ua,ip` columns are dropped (the same test List redacts by);
/// canonical columns the file lacks are appended as trailing columns in
/// schema order. Existing column order is kept. Data rows stay untouched
/// unless both happen at once.
fn reconcile_columns(kind: RecordKind, columns: &[String]) -> Option<Reconciled> {
    let retired = legacy::has_trailing_ua_ip(columns);
    let mut merged: Vec<String> = if retired {
        columns[..columns.len() - legacy::RETIRED_COLUMNS.len()].to_vec()
    } else {
        columns.to_vec()
    };

    let kept = merged.len();
    for column in kind.columns() {
        if !merged.iter().any(|c| c.eq_ignore_ascii_case(column)) {
            merged.push((*column).to_string());
        }
    }
    let grew = merged.len() != kept;

    (retired || grew).then(|| Reconciled {
        columns: merged,
        truncate_rows_to: (retired && grew).then_some(kept),
    })
}

/// Build the next file content from what the store returned.
pub(crate) fn next_write(
    kind: RecordKind,
    fetched: Fetched,
    record: &ValidatedRecord,
    timestamp: &str,
) -> NextWrite {
    let (existing, version) = match fetched {
        Fetched::Missing => (None, None),
        Fetched::Found { content, version } => (Some(content), Some(version)),
    };
    let base = match existing {
        Some(content) if !content.trim().is_empty() => content,
        _ => format!("{}\n", kind.header_line()),
    };

    let (header_line, rest) = csv::split_first_line(&base);
    let current = csv::parse_header(header_line);
    let rewritten = reconcile_columns(kind, &current).map(|reconciled| {
        let header = reconciled
            .columns
            .iter()
            .map(|c| csv::escape_field(c))
            .collect::<Vec<_>>()
            .join(",");
        tracing::info!(%kind, header = %header, "rewriting CSV header");
        let content = match reconciled.truncate_rows_to {
            Some(width) => {
                tracing::info!(%kind, width, "dropping legacy ua,ip values from rows");
                format!("{header}{}", csv::truncate_records(rest, width))
            }
            None => format!("{header}{rest}"),
        };
        (reconciled.columns, content)
    });
    let (columns, mut content) = rewritten.unwrap_or((current, base));

    if !content.ends_with('\n') {
        content.push('\n');
    }

    let row: Vec<&str> = columns
        .iter()
        .map(|column| {
            if column.eq_ignore_ascii_case(TIMESTAMP_COLUMN) {
                timestamp
            } else {
                record.get(column)
            }
        })
        .collect();
    content.push_str(&csv::format_record(&row));

    NextWrite { content, version }
}

enum AppendState {
    Fetching { attempt: u32 },
    Writing { attempt: u32, next: NextWrite },
    Conflicted { attempt: u32 },
    Done { attempt: u32 },
    Failed(SignupError),
}

/// Append one validated record to the file at `path`.
///
/// Returns the number of write attempts used.
pub async fn append_record(
    store: &dyn RecordStore,
    path: &str,
    record: &ValidatedRecord,
    policy: &RetryPolicy,
) -> Result<u32, SignupError> {
    let kind = record.kind();
    let timestamp = timestamp_now();
    let max_attempts = policy.max_attempts.max(1);
    let mut state = AppendState::Fetching { attempt: 1 };

    loop {
        state = match state {
            AppendState::Fetching { attempt } => match store.fetch(path).await {
                Ok(fetched) => AppendState::Writing {
                    attempt,
                    next: next_write(kind, fetched, record, &timestamp),
                },
                Err(err) => {
                    tracing::error!(%kind, path, attempt, error = %err, "fetch failed");
                    AppendState::Failed(SignupError::from_fetch(err))
                }
            },
            AppendState::Writing { attempt, next } => {
                match store
                    .write(path, &next.content, next.version.as_ref())
                    .await
                {
                    Ok(_) => AppendState::Done { attempt },
                    Err(err) if err.is_conflict() => AppendState::Conflicted { attempt },
                    Err(err) => {
                        tracing::error!(%kind, path, attempt, error = %err, "write failed");
                        AppendState::Failed(SignupError::from_write(err))
                    }
                }
            }
            AppendState::Conflicted { attempt } if attempt >= max_attempts => {
                tracing::error!(%kind, path, attempts = attempt, "write conflict, giving up");
                AppendState::Failed(SignupError::WriteConflict {
                    path: path.to_string(),
                    attempts: attempt,
                })
            }
            AppendState::Conflicted { attempt } => {
                let sleep = policy.backoff(attempt);
                tracing::warn!(
                    %kind,
                    path,
                    attempt,
                    max_attempts,
                    backoff_ms = sleep.as_millis() as u64,
                    "write conflict, retrying"
                );
                if !sleep.is_zero() {
                    tokio::time::sleep(sleep).await;
                }
                AppendState::Fetching {
                    attempt: attempt + 1,
                }
            }
            AppendState::Done { attempt } => {
                tracing::info!(%kind, path, attempts = attempt, "record appended");
                return Ok(attempt);
            }
            AppendState::Failed(err) => return Err(err),
        };
    }
}
