//! Record kinds and their CSV schemas.
//!
//! Each kind owns an ordered column list, a required subset, and the legacy
//! aliases older form handlers still send.

use serde::{Deserialize, Serialize};

/// Column holding the server-generated append time.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

const WAITLIST_COLUMNS: &[&str] = &["timestamp", "name", "email", "role", "note"];
const WAITLIST_REQUIRED: &[&str] = &["name", "email"];
const WAITLIST_ALIASES: &[(&str, &str)] = &[("discipline", "role"), ("notes", "note")];

const SPONSOR_COLUMNS: &[&str] = &[
    "timestamp",
    "org",
    "name",
    "email",
    "phone",
    "subject",
    "message",
    "budget",
    "interests",
];
const SPONSOR_REQUIRED: &[&str] = &["org", "name", "email"];
const SPONSOR_ALIASES: &[(&str, &str)] = &[
    ("company", "org"),
    ("organization", "org"),
    ("contact", "name"),
    ("contact_name", "name"),
    ("contact_email", "email"),
    ("tier", "budget"),
];

/// The category of a submitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Waitlist,
    Sponsor,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::Waitlist, RecordKind::Sponsor];

    /// Parse a caller-supplied kind. Accepts the legacy plural `sponsors`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "waitlist" => Some(Self::Waitlist),
            "sponsor" | "sponsors" => Some(Self::Sponsor),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waitlist => "waitlist",
            Self::Sponsor => "sponsor",
        }
    }

    /// Ordered column names of the current schema.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Waitlist => WAITLIST_COLUMNS,
            Self::Sponsor => SPONSOR_COLUMNS,
        }
    }

    pub fn required(&self) -> &'static [&'static str] {
        match self {
            Self::Waitlist => WAITLIST_REQUIRED,
            Self::Sponsor => SPONSOR_REQUIRED,
        }
    }

    /// `(legacy key, canonical column)` pairs.
    pub fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Waitlist => WAITLIST_ALIASES,
            Self::Sponsor => SPONSOR_ALIASES,
        }
    }

    /// Canonical header line, without the trailing newline.
    pub fn header_line(&self) -> String {
        self.columns().join(",")
    }

    /// Default repository path of the kind's CSV file.
    pub fn default_path(&self) -> &'static str {
        match self {
            Self::Waitlist => "data/waitlist.csv",
            Self::Sponsor => "data/sponsors.csv",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Repository paths for each kind's CSV file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindPaths {
    pub waitlist: String,
    pub sponsor: String,
}

impl Default for KindPaths {
    fn default() -> Self {
        Self {
            waitlist: RecordKind::Waitlist.default_path().to_string(),
            sponsor: RecordKind::Sponsor.default_path().to_string(),
        }
    }
}

impl KindPaths {
    pub fn path_for(&self, kind: RecordKind) -> &str {
        match kind {
            RecordKind::Waitlist => &self.waitlist,
            RecordKind::Sponsor => &self.sponsor,
        }
    }
}
