use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{VidstampError, VidstampResult};

/// Field name used to name an item's output file.
pub const ID_FIELD: &str = "id";

/// A single record field: text (also used for file paths) or a number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// JSON number.
    Number(f64),
    /// JSON string.
    Text(String),
}

impl FieldValue {
    /// Numeric view; numeric strings such as `"2.5"` are accepted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            // Integral numbers print without a fractional part so `1` names `1.mp4`.
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

/// Per-video data: field name to value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl DataRecord {
    /// Record with no fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Explicit output id, if the record carries a non-empty `id` field.
    pub fn id(&self) -> Option<String> {
        self.fields
            .get(ID_FIELD)
            .map(ToString::to_string)
            .filter(|s| !s.trim().is_empty())
    }

    /// Fields in key order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for DataRecord {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Load a manifest of records: a JSON array of objects, or JSON Lines (one object per line).
pub fn load_records(path: impl AsRef<Path>) -> VidstampResult<Vec<DataRecord>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| {
        VidstampError::config(format!("read records '{}': {e}", path.display()))
    })?;
    parse_records(&text).map_err(|e| match e {
        VidstampError::Config(msg) => {
            VidstampError::config(format!("records '{}': {msg}", path.display()))
        }
        other => other,
    })
}

/// Parse a manifest already in memory; see [`load_records`].
pub fn parse_records(text: &str) -> VidstampResult<Vec<DataRecord>> {
    let trimmed = text.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| VidstampError::config(format!("parse JSON array: {e}")));
    }

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map_err(|e| VidstampError::config(format!("line {}: {e}", i + 1)))
        })
        .collect()
}

#[cfg(test)]
#[path = "../tests/unit/record.rs"]
mod tests;
