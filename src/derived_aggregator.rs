//! Summary numbers for dashboard stat cards and charts.
//!
//! Each [`MetricSpec`] names one reduction over a collection or view. Results
//! keep the order the metrics were requested in. No reduction ever yields NaN:
//! empty denominators produce 0.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::field_value::FieldValue;
use crate::local_db_model::Record;
use crate::query_pipeline::Predicate;

/// Group label for records with no value in the grouped field.
pub const NO_VALUE_LABEL: &str = "(none)";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    #[serde(flatten)]
    pub metric: Metric,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metric {
    Count,
    CountWhere { field: String, predicate: Predicate },
    Sum { field: String },
    SumWhere { field: String, where_field: String, predicate: Predicate },
    /// Mean over the records that carry a numeric value.
    Average { field: String },
    Min { field: String },
    Max { field: String },
    /// Share of all records matching `predicate`, as 0–100.
    Percent { field: String, predicate: Predicate },
    GroupCount { field: String },
    /// Sum of `field` per distinct value of `by`.
    GroupSum { field: String, by: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Groups(IndexMap<String, f64>),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AggregateResult {
    values: IndexMap<String, MetricValue>,
}

impl AggregateResult {
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.values.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.values.get(name) {
            Some(MetricValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn groups(&self, name: &str) -> Option<&IndexMap<String, f64>> {
        match self.values.get(name) {
            Some(MetricValue::Groups(groups)) => Some(groups),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl MetricSpec {
    pub fn new(name: &str, metric: Metric) -> Self {
        MetricSpec {
            name: name.to_string(),
            metric,
        }
    }
}

/// Division that answers 0 instead of NaN or infinity.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let ratio = numerator / denominator;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// `part` as a percentage of `total`, 0 when `total` is 0.
pub fn percent(part: usize, total: usize) -> f64 {
    safe_ratio(part as f64 * 100.0, total as f64)
}

/// Evaluates every metric against the current records.
pub fn aggregate<'a, T, I>(records: I, metrics: &[MetricSpec]) -> AggregateResult
where
    T: Record + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let records: Vec<&T> = records.into_iter().collect();
    let mut result = AggregateResult::default();
    for spec in metrics {
        let value = evaluate(&records, &spec.metric);
        result.values.insert(spec.name.clone(), value);
    }
    result
}

fn evaluate<T: Record>(records: &[&T], metric: &Metric) -> MetricValue {
    match metric {
        Metric::Count => MetricValue::Number(records.len() as f64),
        Metric::CountWhere { field, predicate } => {
            MetricValue::Number(count_matching(records, field, predicate) as f64)
        }
        Metric::Sum { field } => MetricValue::Number(numbers(records, field).into_iter().sum()),
        Metric::SumWhere {
            field,
            where_field,
            predicate,
        } => {
            let total: f64 = records
                .iter()
                .filter(|r| predicate.matches(&r.field(where_field)))
                .filter_map(|r| r.field(field).as_number())
                .sum();
            MetricValue::Number(total)
        }
        Metric::Average { field } => {
            let values = numbers(records, field);
            let sum: f64 = values.iter().sum();
            let count = values.len();
            MetricValue::Number(safe_ratio(sum, count as f64))
        }
        Metric::Min { field } => {
            MetricValue::Number(numbers(records, field).into_iter().reduce(f64::min).unwrap_or(0.0))
        }
        Metric::Max { field } => {
            MetricValue::Number(numbers(records, field).into_iter().reduce(f64::max).unwrap_or(0.0))
        }
        Metric::Percent { field, predicate } => {
            MetricValue::Number(percent(count_matching(records, field, predicate), records.len()))
        }
        Metric::GroupCount { field } => {
            let mut groups = IndexMap::new();
            for record in records {
                for label in group_labels(&record.field(field)) {
                    *groups.entry(label).or_insert(0.0) += 1.0;
                }
            }
            MetricValue::Groups(groups)
        }
        Metric::GroupSum { field, by } => {
            let mut groups = IndexMap::new();
            for record in records {
                let amount = record.field(field).as_number().unwrap_or(0.0);
                for label in group_labels(&record.field(by)) {
                    *groups.entry(label).or_insert(0.0) += amount;
                }
            }
            MetricValue::Groups(groups)
        }
    }
}

fn numbers<T: Record>(records: &[&T], field: &str) -> Vec<f64> {
    records.iter().filter_map(|r| r.field(field).as_number()).collect()
}

fn count_matching<T: Record>(records: &[&T], field: &str, predicate: &Predicate) -> usize {
    records
        .iter()
        .filter(|r| predicate.matches(&r.field(field)))
        .count()
}

fn group_labels(value: &FieldValue) -> Vec<String> {
    let labels: Vec<String> = value
        .leaves()
        .into_iter()
        .filter(|leaf| !leaf.is_blank())
        .map(FieldValue::display_text)
        .collect();
    if labels.is_empty() {
        vec![NO_VALUE_LABEL.to_string()]
    } else {
        labels
    }
}
