//! Read path: parse a kind's CSV into rows, dropping retired columns.

use serde::Serialize;
use serde::ser::SerializeMap;

use crate::csv;
use crate::error::SignupError;
use crate::kind::RecordKind;
use crate::legacy;
use crate::store::{Fetched, RecordStore};

/// One data row: column name → value, in header order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(String, String)>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(_, v)| v.as_str())
    }
}

impl Serialize for Row {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (name, value) in &self.cells {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A kind's rows in stored (chronological) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub kind: RecordKind,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Malformed records left out of `rows`.
    pub skipped: usize,
}

impl Table {
    /// Canonical header, no rows.
    pub fn empty(kind: RecordKind) -> Self {
        Self {
            kind,
            columns: kind.columns().iter().map(|c| (*c).to_string()).collect(),
            rows: Vec::new(),
            skipped: 0,
        }
    }

    /// Parse stored CSV text.
    ///
    /// Retired trailing `ua,ip` columns are removed, and every row is cut or
    /// padded to the header width so values from retired columns never leak.
    pub fn from_csv(kind: RecordKind, text: &str) -> Self {
        if text.trim().is_empty() {
            return Self::empty(kind);
        }

        // The header is always the first physical line; `rest` keeps that
        // line's terminator so record line numbers stay file-relative.
        let (header_line, rest) = csv::split_first_line(text);
        let mut columns = csv::parse_header(header_line);

        let parsed = csv::parse(rest);
        for error in &parsed.errors {
            tracing::warn!(%kind, line = error.line, error = %error.kind, "skipping malformed CSV record");
        }

        if legacy::has_trailing_ua_ip(&columns) {
            columns.truncate(columns.len() - legacy::RETIRED_COLUMNS.len());
        }

        let rows = parsed
            .records
            .into_iter()
            .map(|record| {
                let mut fields = record.fields.into_iter();
                let cells = columns
                    .iter()
                    .map(|name| (name.clone(), fields.next().unwrap_or_default()))
                    .collect();
                Row { cells }
            })
            .collect();

        Self {
            kind,
            columns,
            rows,
            skipped: parsed.errors.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as CSV text: header line then one line per row.
    pub fn to_csv(&self) -> String {
        let mut out = csv::format_record(&self.columns);
        for row in &self.rows {
            let values: Vec<&str> = row.values().collect();
            out.push_str(&csv::format_record(&values));
        }
        out
    }
}

/// Fetch and parse the file at `path`. A missing file is an empty table.
pub async fn list_records(
    store: &dyn RecordStore,
    path: &str,
    kind: RecordKind,
) -> Result<Table, SignupError> {
    match store.fetch(path).await {
        Ok(Fetched::Missing) => {
            tracing::debug!(%kind, path, "no file yet, returning empty table");
            Ok(Table::empty(kind))
        }
        Ok(Fetched::Found { content, .. }) => Ok(Table::from_csv(kind, &content)),
        Err(err) => {
            tracing::error!(%kind, path, error = %err, "list fetch failed");
            Err(SignupError::from_fetch(err))
        }
    }
}
