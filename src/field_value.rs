//! Uniform view of a single record field.
//!
//! Records are arbitrary serde structures; queries, aggregates and exports
//! address their fields by name and see them through [`FieldValue`]. Nested
//! objects flatten into a [`FieldValue::List`] of their leaf values so that
//! membership checks ("is this id referenced anywhere under `days`?") work
//! without knowing the shape.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<FieldValue>),
}

/// How a column or sort key should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Infer from the value: numbers and numeric text numerically, ISO-looking text as dates, other text as text.
    #[default]
    Auto,
    Number,
    Text,
    Date,
    Bool,
    /// Several values; CSV cells split on `;`.
    List,
}

impl FieldValue {
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => FieldValue::Null,
            JsonValue::Bool(b) => FieldValue::Bool(*b),
            JsonValue::Number(n) => n.as_f64().map(FieldValue::Number).unwrap_or(FieldValue::Null),
            JsonValue::String(s) => FieldValue::Text(s.clone()),
            JsonValue::Array(items) => FieldValue::List(items.iter().map(FieldValue::from_json).collect()),
            JsonValue::Object(map) => FieldValue::List(map.values().map(FieldValue::from_json).collect()),
        }
    }

    /// Resolves a dotted path (`"customer.name"`) against a JSON object.
    pub fn lookup(root: &JsonValue, path: &str) -> Self {
        let mut current = root;
        for segment in path.split('.') {
            match current.get(segment) {
                Some(next) => current = next,
                None => return FieldValue::Null,
            }
        }
        FieldValue::from_json(current)
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::Null => JsonValue::Null,
            FieldValue::Bool(b) => JsonValue::Bool(*b),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            FieldValue::Text(s) => JsonValue::String(s.clone()),
            FieldValue::List(items) => JsonValue::Array(items.iter().map(FieldValue::to_json).collect()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Null, whitespace-only text, or an empty list.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Numbers as-is; numeric text is parsed, since imported data often stores `"12.50"`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) if n.is_finite() => Some(*n),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            FieldValue::Text(s) => parse_date(s),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text used for display, search and CSV cells. Lists join with `"; "`.
    pub fn display_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::List(items) => items
                .iter()
                .map(FieldValue::display_text)
                .collect::<Vec<_>>()
                .join("; "),
        }
    }

    /// Scalar values, descending into lists.
    pub fn leaves(&self) -> Vec<&FieldValue> {
        match self {
            FieldValue::List(items) => items.iter().flat_map(FieldValue::leaves).collect(),
            other => vec![other],
        }
    }

    /// Equality with numeric tolerance for `1` vs `1.0` and numeric text vs numbers.
    pub fn loosely_equals(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Number(a), FieldValue::Number(b)) => a == b,
            (FieldValue::Number(_), FieldValue::Text(_)) | (FieldValue::Text(_), FieldValue::Number(_)) => {
                match (self.as_number(), other.as_number()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            _ => self == other,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM[:SS[.fff]]` and `YYYY-MM-DD HH:MM:SS`.
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.len() < 10 {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Locale-style text ordering.
///
/// Letters compare without accents or case first (`"éclair"` sorts before
/// `"fig"`). Ties put unaccented before accented, then lowercase before
/// uppercase.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    collation_key(a, true)
        .cmp(&collation_key(b, true))
        .then_with(|| collation_key(a, false).cmp(&collation_key(b, false)))
        .then_with(|| b.cmp(a))
}

/// Lowercased canonical decomposition, optionally without combining marks.
fn collation_key(text: &str, strip_marks: bool) -> String {
    text.nfd()
        .filter(|c| !(strip_marks && is_combining_mark(*c)))
        .flat_map(char::to_lowercase)
        .collect()
}
