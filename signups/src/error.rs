use thiserror::Error;

use crate::kind::RecordKind;
use crate::store::StoreError;

/// Errors surfaced by [`crate::Signups`] operations.
#[derive(Debug, Error)]
pub enum SignupError {
    #[error("Unknown kind: {0}")]
    UnknownKind(String),

    #[error("Bad payload: {0}")]
    BadPayload(String),

    /// Required fields blank after alias resolution and trimming.
    #[error("Missing fields for {kind} ({})", fields.join(","))]
    MissingFields {
        kind: RecordKind,
        fields: Vec<&'static str>,
    },

    #[error("Server not configured (missing {})", missing.join(", "))]
    NotConfigured { missing: Vec<&'static str> },

    /// Reading the current file failed.
    #[error("Upstream read failed: {0}")]
    Fetch(#[source] StoreError),

    /// Writing failed for a reason other than a version conflict.
    #[error("Write failed: {0}")]
    Write(#[source] StoreError),

    /// Every attempt lost the race to a concurrent writer.
    #[error("Write conflict on {path} after {attempts} attempts")]
    WriteConflict { path: String, attempts: u32 },
}

/// Coarse classification for callers mapping errors onto a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller sent something unusable; not retryable.
    Invalid,
    /// Connection parameters are missing.
    Misconfigured,
    /// The store could not be read.
    Upstream,
    /// The store could not be written.
    Internal,
}

impl SignupError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownKind(_) | Self::BadPayload(_) | Self::MissingFields { .. } => {
                ErrorClass::Invalid
            }
            Self::NotConfigured { .. } => ErrorClass::Misconfigured,
            Self::Fetch(_) => ErrorClass::Upstream,
            Self::Write(_) | Self::WriteConflict { .. } => ErrorClass::Internal,
        }
    }

    pub(crate) fn from_fetch(err: StoreError) -> Self {
        match err {
            StoreError::NotConfigured { missing } => Self::NotConfigured { missing },
            other => Self::Fetch(other),
        }
    }

    pub(crate) fn from_write(err: StoreError) -> Self {
        match err {
            StoreError::NotConfigured { missing } => Self::NotConfigured { missing },
            other => Self::Write(other),
        }
    }
}
