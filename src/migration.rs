//! Versioned upgrades applied to raw records when a collection is hydrated.
//!
//! Each step is a pure function lifting one raw JSON record from version `n`
//! to `n + 1`. A collection persisted at version `v` runs steps `v..N` on
//! every record before deserialization, so old data picks up new fields in one
//! place instead of ad hoc defaulting at each read site.

use serde_json::Value as JsonValue;

type Step = Box<dyn Fn(JsonValue) -> JsonValue + Send + Sync>;

#[derive(Default)]
pub struct Migrations {
    steps: Vec<Step>,
}

impl Migrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the step that upgrades version `self.version()` to the next one.
    pub fn step<F>(mut self, upgrade: F) -> Self
    where
        F: Fn(JsonValue) -> JsonValue + Send + Sync + 'static,
    {
        self.steps.push(Box::new(upgrade));
        self
    }

    /// Version written by `save`: the number of registered steps.
    pub fn version(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Runs the steps needed to bring a record stored at `from` up to date.
    /// Records from a newer version than this build knows pass through untouched.
    pub fn upgrade(&self, from: u32, record: JsonValue) -> JsonValue {
        self.steps
            .iter()
            .skip(from as usize)
            .fold(record, |raw, step| step(raw))
    }
}

/// Step that adds any missing top-level field from `defaults`, leaving present ones alone.
pub fn fill_defaults(defaults: JsonValue) -> impl Fn(JsonValue) -> JsonValue + Send + Sync + 'static {
    move |mut record| {
        if let (Some(target), Some(source)) = (record.as_object_mut(), defaults.as_object()) {
            for (name, value) in source {
                target.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }
        record
    }
}

/// Step that renames a top-level field, keeping its value.
pub fn rename_field(from: &'static str, to: &'static str) -> impl Fn(JsonValue) -> JsonValue + Send + Sync + 'static {
    move |mut record| {
        if let Some(object) = record.as_object_mut() {
            if let Some(value) = object.remove(from) {
                object.entry(to.to_string()).or_insert(value);
            }
        }
        record
    }
}
