//! Incoming payload normalization and field validation.
//!
//! Older form handlers post several payload shapes and renamed keys; all of
//! them resolve to one [`ValidatedRecord`] per kind before anything touches
//! the store.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::SignupError;
use crate::kind::{RecordKind, TIMESTAMP_COLUMN};

const KIND_KEYS: &[&str] = &["kind", "type", "form", "section"];
const DATA_KEYS: &[&str] = &["data", "payload"];
const HONEYPOT_KEYS: &[&str] = &["honeypot", "honey"];

/// A request body split into its kind and field map.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub kind: String,
    pub data: Map<String, Value>,
}

/// Accepts `{kind, data}`, `{type, payload}`, or a flat object carrying its
/// own `kind`/`type`/`form`/`section` key.
pub fn normalize_payload(body: &Value) -> Result<Payload, SignupError> {
    let bad = || SignupError::BadPayload("missing kind/data".to_string());
    let object = body.as_object().ok_or_else(bad)?;

    let kind = KIND_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|kind| !kind.is_empty())
        .ok_or_else(bad)?;

    let data = match DATA_KEYS.iter().find_map(|key| object.get(*key)) {
        Some(Value::Object(data)) => data.clone(),
        Some(_) => return Err(bad()),
        None => object.clone(),
    };

    Ok(Payload {
        kind: kind.to_string(),
        data,
    })
}

/// Render a loosely-typed JSON value as field text.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// True when a hidden honeypot field was filled in.
pub fn is_honeypot(data: &Map<String, Value>) -> bool {
    HONEYPOT_KEYS
        .iter()
        .filter_map(|key| data.get(*key))
        .any(truthy)
}

/// Field values for one kind, keyed by canonical column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRecord {
    kind: RecordKind,
    values: HashMap<&'static str, String>,
}

impl ValidatedRecord {
    /// Resolve aliases, trim, and check required fields.
    ///
    /// A canonical key wins over its aliases unless it is blank. Unknown keys
    /// and any caller-supplied `timestamp` are ignored.
    pub fn from_fields(
        kind: RecordKind,
        data: &Map<String, Value>,
    ) -> Result<Self, SignupError> {
        let mut values = HashMap::new();
        for column in kind.columns().iter().copied() {
            if column == TIMESTAMP_COLUMN {
                continue;
            }
            let direct = data.get(column).map(value_text);
            let value = match direct {
                Some(v) if !v.is_empty() => v,
                _ => kind
                    .aliases()
                    .iter()
                    .filter(|(_, canonical)| *canonical == column)
                    .filter_map(|(alias, _)| data.get(*alias))
                    .map(value_text)
                    .find(|v| !v.is_empty())
                    .unwrap_or_default(),
            };
            values.insert(column, value);
        }

        let missing: Vec<&'static str> = kind
            .required()
            .iter()
            .copied()
            .filter(|column| values.get(column).is_none_or(String::is_empty))
            .collect();
        if !missing.is_empty() {
            return Err(SignupError::MissingFields {
                kind,
                fields: missing,
            });
        }

        Ok(Self { kind, values })
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Value for a column, matched case-insensitively; blank when unknown.
    pub fn get(&self, column: &str) -> &str {
        self.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column.trim()))
            .map_or("", |(_, value)| value.as_str())
    }
}
