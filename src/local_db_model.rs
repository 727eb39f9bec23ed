//! Record definitions for collections.
//!
//! Any serde structure with a string `id` can live in a collection by
//! implementing [`Record`]. Hosts that only know their records as JSON use
//! [`JsonRecord`], which keeps the `id` typed and every other field as-is.
//!
//! ```rust
//! use local_collection_core::local_db_model::{JsonRecord, Record};
//! use local_collection_core::field_value::FieldValue;
//! use serde_json::json;
//!
//! let spot = JsonRecord::from_value(json!({
//!     "id": "spot-1",
//!     "address": "12 Harbour St",
//!     "price": 3.5,
//!     "owner": { "name": "Dana" }
//! }))?;
//!
//! assert_eq!(spot.id(), "spot-1");
//! assert_eq!(spot.field("price"), FieldValue::Number(3.5));
//! assert_eq!(spot.field("owner.name"), FieldValue::from("Dana"));
//! # Ok::<(), local_collection_core::app_response::AppResponse>(())
//! ```

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::app_response::AppResponse;
use crate::field_value::FieldValue;

/// A uniquely identified entity stored in a collection.
///
/// The default [`Record::field`] goes through `serde_json`, so field names
/// are the serialized names (after any `#[serde(rename)]`).
pub trait Record: Serialize + DeserializeOwned + Clone {
    fn id(&self) -> &str;

    fn field(&self, path: &str) -> FieldValue {
        match serde_json::to_value(self) {
            Ok(value) => FieldValue::lookup(&value, path),
            Err(_) => FieldValue::Null,
        }
    }
}

/// A record whose fields are only known at runtime.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct JsonRecord {
    pub id: String,

    #[serde(flatten)]
    pub fields: Map<String, JsonValue>,
}

impl JsonRecord {
    pub fn new(id: impl Into<String>) -> Self {
        JsonRecord {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter, mostly for seed data.
    ///
    /// `"id"` replaces the record id when given a string and is ignored
    /// otherwise; it never lands in `fields`.
    pub fn with(mut self, name: &str, value: impl Into<JsonValue>) -> Self {
        match (name, value.into()) {
            ("id", JsonValue::String(id)) => self.id = id,
            ("id", other) => debug!("Ignoring non-string id {other} for record '{}'", self.id),
            (name, value) => {
                self.fields.insert(name.to_string(), value);
            }
        }
        self
    }

    pub fn from_value(value: JsonValue) -> Result<Self, AppResponse> {
        let record: JsonRecord = serde_json::from_value(value)?;
        if record.id.trim().is_empty() {
            return Err(AppResponse::ValidationError("Record id cannot be empty".to_string()));
        }
        Ok(record)
    }
}

impl Record for JsonRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn field(&self, path: &str) -> FieldValue {
        if path == "id" {
            return FieldValue::Text(self.id.clone());
        }
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        match (self.fields.get(head), rest) {
            (Some(value), None) => FieldValue::from_json(value),
            (Some(value), Some(rest)) => FieldValue::lookup(value, rest),
            (None, _) => FieldValue::Null,
        }
    }
}

/// Generates an id for hosts that do not bring their own.
pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
