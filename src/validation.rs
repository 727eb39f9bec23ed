//! Pre-mutation checks: field validators for create/edit and guards for delete.

use crate::app_response::FieldError;
use crate::field_value::FieldValue;
use crate::local_db_model::Record;

/// Checks a candidate record before it is written. An empty vector means valid.
pub trait RecordValidator<T> {
    fn validate(&self, record: &T) -> Vec<FieldError>;
}

impl<T, F> RecordValidator<T> for F
where
    F: Fn(&T) -> Vec<FieldError>,
{
    fn validate(&self, record: &T) -> Vec<FieldError> {
        self(record)
    }
}

/// Fails for every listed field that is missing, blank, or an empty list.
#[derive(Debug, Clone)]
pub struct RequiredFields {
    fields: Vec<String>,
}

impl RequiredFields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RequiredFields {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl<T: Record> RecordValidator<T> for RequiredFields {
    fn validate(&self, record: &T) -> Vec<FieldError> {
        self.fields
            .iter()
            .filter(|field| record.field(field).is_blank())
            .map(|field| FieldError::new(field.as_str(), format!("{field} is required")))
            .collect()
    }
}

/// Decides whether a record may be deleted. `Some(reason)` refuses the delete.
pub trait DeleteGuard<T> {
    fn refusal(&self, record: &T) -> Option<String>;
}

impl<T, F> DeleteGuard<T> for F
where
    F: Fn(&T) -> Option<String>,
{
    fn refusal(&self, record: &T) -> Option<String> {
        self(record)
    }
}

/// Refuses deletion while any record of another collection mentions the id
/// somewhere under `field` (nested objects and lists included).
///
/// A meal planner uses it as
/// `ReferenceGuard::new(week_plans.records(), "days", "week plan")`
/// so a meal sitting in a day slot cannot be removed.
pub struct ReferenceGuard<'a, R: Record> {
    referrers: &'a [R],
    field: String,
    label: String,
}

impl<'a, R: Record> ReferenceGuard<'a, R> {
    pub fn new(referrers: &'a [R], field: &str, label: &str) -> Self {
        ReferenceGuard {
            referrers,
            field: field.to_string(),
            label: label.to_string(),
        }
    }
}

impl<'a, T: Record, R: Record> DeleteGuard<T> for ReferenceGuard<'a, R> {
    fn refusal(&self, record: &T) -> Option<String> {
        let target = FieldValue::Text(record.id().to_string());
        let referrer = self.referrers.iter().find(|r| {
            r.field(&self.field)
                .leaves()
                .into_iter()
                .any(|leaf| leaf.loosely_equals(&target))
        })?;
        Some(format!(
            "'{}' is still used by {} '{}'",
            record.id(),
            self.label,
            referrer.id()
        ))
    }
}
