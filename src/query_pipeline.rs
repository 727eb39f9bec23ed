//! Search, filter and sort over a collection, producing a read-only view.
//!
//! The view borrows from the collection; nothing here mutates records.
//!
//! ```rust
//! use local_collection_core::local_db_model::JsonRecord;
//! use local_collection_core::query_pipeline::{query, Predicate, Query, SortDirection};
//!
//! let invoices = vec![
//!     JsonRecord::new("1").with("client", "Acme").with("amount", 120.0).with("status", "Paid"),
//!     JsonRecord::new("2").with("client", "Globex").with("amount", 80.0).with("status", "Overdue"),
//!     JsonRecord::new("3").with("client", "Acme Labs").with("amount", 40.0).with("status", "Overdue"),
//! ];
//!
//! let view = query(
//!     &invoices,
//!     &Query::new()
//!         .search("acme", ["client"])
//!         .filter("status", Predicate::equals_or_any("Overdue"))
//!         .sort_by("amount", SortDirection::Desc),
//! );
//! assert_eq!(view.len(), 1);
//! assert_eq!(view[0].id, "3");
//! ```

use std::cmp::Ordering;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::field_value::{locale_cmp, parse_date, FieldKind, FieldValue};
use crate::local_db_model::Record;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    /// Free-text term; blank matches everything.
    #[serde(default)]
    pub search: String,
    /// Fields the term is matched against; empty means every field.
    #[serde(default)]
    pub search_fields: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    #[serde(flatten)]
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// The "all" choice of a dropdown.
    Any,
    Equals {
        value: FieldValue,
    },
    /// Case-insensitive substring.
    Contains {
        text: String,
    },
    /// Inclusive bounds, numeric or chronological depending on the bound.
    Range {
        #[serde(default)]
        min: Option<FieldValue>,
        #[serde(default)]
        max: Option<FieldValue>,
    },
    /// Set membership; an empty set selects everything.
    OneOf {
        values: Vec<FieldValue>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(default)]
    pub kind: FieldKind,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search<I, S>(mut self, term: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search = term.to_string();
        self.search_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, field: &str, predicate: Predicate) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            predicate,
        });
        self
    }

    pub fn sort_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.sort = Some(SortSpec {
            field: field.to_string(),
            direction,
            kind: FieldKind::Auto,
        });
        self
    }

    pub fn sort_as(mut self, field: &str, direction: SortDirection, kind: FieldKind) -> Self {
        self.sort = Some(SortSpec {
            field: field.to_string(),
            direction,
            kind,
        });
        self
    }
}

impl Predicate {
    pub fn equals(value: impl Into<FieldValue>) -> Self {
        Predicate::Equals { value: value.into() }
    }

    /// Dropdown semantics: `"all"` (any case) or blank selects everything.
    pub fn equals_or_any(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            Predicate::Any
        } else {
            Predicate::Equals {
                value: FieldValue::Text(value.to_string()),
            }
        }
    }

    pub fn contains(text: &str) -> Self {
        Predicate::Contains { text: text.to_string() }
    }

    pub fn between(min: Option<FieldValue>, max: Option<FieldValue>) -> Self {
        Predicate::Range { min, max }
    }

    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Predicate::OneOf {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Predicate::Any)
    }

    pub fn matches(&self, value: &FieldValue) -> bool {
        match self {
            Predicate::Any => true,
            Predicate::Equals { value: expected } => {
                value.leaves().iter().any(|leaf| leaf.loosely_equals(expected))
            }
            Predicate::Contains { text } => {
                let needle = text.to_lowercase();
                needle.is_empty() || contains_text(value, &needle)
            }
            Predicate::Range { min, max } => {
                let above = match min {
                    Some(bound) if !bound.is_null() => {
                        matches!(bound_cmp(value, bound), Some(Ordering::Greater | Ordering::Equal))
                    }
                    _ => true,
                };
                let below = match max {
                    Some(bound) if !bound.is_null() => {
                        matches!(bound_cmp(value, bound), Some(Ordering::Less | Ordering::Equal))
                    }
                    _ => true,
                };
                above && below
            }
            Predicate::OneOf { values } => {
                values.is_empty()
                    || value
                        .leaves()
                        .iter()
                        .any(|leaf| values.iter().any(|v| leaf.loosely_equals(v)))
            }
        }
    }
}

impl Filter {
    pub fn matches<T: Record>(&self, record: &T) -> bool {
        self.predicate.is_any() || self.predicate.matches(&record.field(&self.field))
    }
}

fn contains_text(value: &FieldValue, needle_lower: &str) -> bool {
    value
        .leaves()
        .iter()
        .any(|leaf| !leaf.is_null() && leaf.display_text().to_lowercase().contains(needle_lower))
}

fn bound_cmp(value: &FieldValue, bound: &FieldValue) -> Option<Ordering> {
    if let FieldValue::Number(b) = bound {
        return value.as_number().and_then(|v| v.partial_cmp(b));
    }
    if let Some(b) = bound.as_date() {
        return value.as_date().map(|v| v.cmp(&b));
    }
    if let Some(b) = bound.as_number() {
        return value.as_number().and_then(|v| v.partial_cmp(&b));
    }
    match (value.as_text(), bound.as_text()) {
        (Some(v), Some(b)) => Some(locale_cmp(v, b)),
        _ => None,
    }
}

fn matches_search<T: Record>(record: &T, term_lower: &str, fields: &[String]) -> bool {
    if term_lower.is_empty() {
        return true;
    }
    if fields.is_empty() {
        return match serde_json::to_value(record) {
            Ok(whole) => contains_text(&FieldValue::from_json(&whole), term_lower),
            Err(_) => false,
        };
    }
    fields
        .iter()
        .any(|field| contains_text(&record.field(field), term_lower))
}

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Number(f64),
    Date(NaiveDateTime),
    Bool(bool),
    Text(String),
    Missing,
}

impl SortKey {
    fn from_value(value: FieldValue, kind: FieldKind) -> Self {
        match kind {
            FieldKind::Number => value.as_number().map(SortKey::Number).unwrap_or(SortKey::Missing),
            FieldKind::Date => value.as_date().map(SortKey::Date).unwrap_or(SortKey::Missing),
            FieldKind::Bool => match value {
                FieldValue::Bool(b) => SortKey::Bool(b),
                _ => SortKey::Missing,
            },
            FieldKind::Text | FieldKind::List => {
                if value.is_blank() {
                    SortKey::Missing
                } else {
                    SortKey::Text(value.display_text())
                }
            }
            FieldKind::Auto => {
                // Numeric text (CSV imports store cells as strings) sorts as a number.
                if let Some(n) = value.as_number() {
                    return SortKey::Number(n);
                }
                match value {
                    FieldValue::Null | FieldValue::Number(_) => SortKey::Missing,
                    FieldValue::Bool(b) => SortKey::Bool(b),
                    FieldValue::Text(s) => match parse_date(&s) {
                        Some(date) => SortKey::Date(date),
                        None => SortKey::Text(s),
                    },
                    list @ FieldValue::List(_) => SortKey::Text(list.display_text()),
                }
            }
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Number(_) => 0,
            SortKey::Date(_) => 1,
            SortKey::Bool(_) => 2,
            SortKey::Text(_) => 3,
            SortKey::Missing => 4,
        }
    }

    fn compare(&self, other: &SortKey) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (SortKey::Date(a), SortKey::Date(b)) => a.cmp(b),
            (SortKey::Bool(a), SortKey::Bool(b)) => a.cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => locale_cmp(a, b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl SortSpec {
    fn order(&self, a: &SortKey, b: &SortKey) -> Ordering {
        // Missing values stay at the end in both directions.
        match (a, b) {
            (SortKey::Missing, SortKey::Missing) => Ordering::Equal,
            (SortKey::Missing, _) => Ordering::Greater,
            (_, SortKey::Missing) => Ordering::Less,
            _ => match self.direction {
                SortDirection::Asc => a.compare(b),
                SortDirection::Desc => a.compare(b).reverse(),
            },
        }
    }
}

/// Runs search, filters and sort over `records`.
///
/// Records with equal sort keys keep their collection order. An empty
/// collection or a query nothing satisfies yields an empty view.
pub fn query<'a, T: Record>(records: &'a [T], query: &Query) -> Vec<&'a T> {
    let term = query.search.trim().to_lowercase();
    let view: Vec<&T> = records
        .iter()
        .filter(|record| matches_search(*record, &term, &query.search_fields))
        .filter(|record| query.filters.iter().all(|f| f.matches(*record)))
        .collect();

    let Some(sort) = &query.sort else {
        return view;
    };

    let mut keyed: Vec<(SortKey, &T)> = view
        .into_iter()
        .map(|record| (SortKey::from_value(record.field(&sort.field), sort.kind), record))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| sort.order(a, b));
    keyed.into_iter().map(|(_, record)| record).collect()
}
