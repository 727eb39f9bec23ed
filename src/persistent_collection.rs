//! The authoritative in-memory list of one entity type, mirrored to a durable store.
//!
//! Every mutation writes the whole collection under its key before returning.
//! When the write fails the in-memory list is restored, so callers never see
//! state that the store does not also hold.
//!
//! ```rust
//! use local_collection_core::durable_store::MemoryStore;
//! use local_collection_core::local_db_model::JsonRecord;
//! use local_collection_core::persistent_collection::PersistentCollection;
//! use local_collection_core::query_pipeline::Query;
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! let mut todos: PersistentCollection<JsonRecord, _> =
//!     PersistentCollection::load(&store, "todos_v3", Vec::new());
//!
//! todos.add(JsonRecord::new("1").with("title", "Buy milk").with("done", false))?;
//! todos.update("1", json!({ "done": true }))?;
//!
//! let view = todos.query(&Query::new().search("milk", ["title"]));
//! assert_eq!(view.len(), 1);
//! # Ok::<(), local_collection_core::app_response::AppResponse>(())
//! ```

use std::collections::HashSet;

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::app_response::AppResponse;
use crate::derived_aggregator::{aggregate, AggregateResult, MetricSpec};
use crate::durable_store::DurableStore;
use crate::exporter::{self, Column};
use crate::local_db_model::Record;
use crate::migration::Migrations;
use crate::query_pipeline::{self, Query};
use crate::validation::DeleteGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Add the batch after the existing records.
    #[default]
    Append,
    /// Discard existing records and keep only the batch.
    Replace,
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    version: u32,
    records: &'a [T],
}

pub struct PersistentCollection<T: Record, S: DurableStore> {
    key: String,
    store: S,
    records: Vec<T>,
    version: u32,
}

impl<T: Record, S: DurableStore> PersistentCollection<T, S> {
    /// Hydrates from `key`, or seeds with `default` when nothing usable is stored.
    pub fn load(store: S, key: &str, default: Vec<T>) -> Self {
        Self::load_with(store, key, default, &Migrations::new())
    }

    /// Like [`load`](Self::load), running `migrations` on records stored by older versions.
    ///
    /// Missing or malformed stored text is never an error: it is logged, the
    /// default collection is used and persisted right away. When the store
    /// itself cannot be read, the default is used in memory only and the
    /// stored text is left alone.
    pub fn load_with(store: S, key: &str, default: Vec<T>, migrations: &Migrations) -> Self {
        let mut persist_default = true;
        let hydrated = match store.read(key) {
            Ok(Some(text)) => match decode::<T>(&text, migrations) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    warn!("Stored data for '{key}' is unreadable, falling back to defaults: {e}");
                    None
                }
            },
            Ok(None) => {
                info!("No stored data for '{key}', seeding {} default records", default.len());
                None
            }
            Err(e) => {
                warn!("Could not read '{key}' from the store, using defaults without overwriting it: {e}");
                persist_default = false;
                None
            }
        };

        let mut collection = PersistentCollection {
            key: key.to_string(),
            store,
            records: Vec::new(),
            version: migrations.version(),
        };

        match hydrated {
            Some((records, stored_version)) => {
                collection.records = records;
                info!("Loaded {} records from '{key}'", collection.records.len());
                if stored_version > collection.version {
                    warn!(
                        "'{key}' was written by a newer build (version {stored_version}, this build knows {}); keeping its version",
                        collection.version
                    );
                    collection.version = stored_version;
                } else if stored_version < collection.version {
                    info!("Upgraded '{key}' from version {stored_version} to {}", collection.version);
                    if let Err(e) = collection.save() {
                        warn!("Could not persist upgraded records for '{key}': {e}");
                    }
                }
            }
            None => {
                collection.records = dedupe(default);
                if persist_default {
                    if let Err(e) = collection.save() {
                        warn!("Could not persist default records for '{key}': {e}");
                    }
                }
            }
        }
        collection
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn records(&self) -> &[T] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Writes the full collection under its key.
    pub fn save(&self) -> Result<(), AppResponse> {
        let text = encode(self.version, &self.records)?;
        self.store.write(&self.key, &text)?;
        debug!("Saved {} records to '{}'", self.records.len(), self.key);
        Ok(())
    }

    /// Appends a record. Its id must be non-empty and not already present.
    pub fn add(&mut self, record: T) -> Result<(), AppResponse> {
        check_id(record.id())?;
        if self.contains(record.id()) {
            return Err(AppResponse::ValidationError(format!(
                "A record with id '{}' already exists",
                record.id()
            )));
        }

        self.records.push(record);
        if let Err(e) = self.save() {
            self.records.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Replaces the fields named in `patch` (a JSON object) on the record with `id`.
    ///
    /// Returns `Ok(false)` and changes nothing when no record has that id.
    /// Patches that change the id or do not fit the record type are rejected.
    pub fn update(&mut self, id: &str, patch: JsonValue) -> Result<bool, AppResponse> {
        let Some(index) = self.position(id) else {
            debug!("Update of unknown id '{id}' in '{}' ignored", self.key);
            return Ok(false);
        };
        let updated = patched(&self.records[index], patch)?;
        self.replace_at(index, updated)?;
        Ok(true)
    }

    /// Typed variant of [`update`](Self::update): `edit` mutates the record in place.
    pub fn update_with<F>(&mut self, id: &str, edit: F) -> Result<bool, AppResponse>
    where
        F: FnOnce(&mut T),
    {
        let Some(index) = self.position(id) else {
            return Ok(false);
        };
        let mut updated = self.records[index].clone();
        edit(&mut updated);
        self.replace_at(index, updated)?;
        Ok(true)
    }

    /// Deletes the record with `id`. Returns `Ok(false)` if it was not there.
    pub fn remove(&mut self, id: &str) -> Result<bool, AppResponse> {
        self.remove_guarded(id, &[])
    }

    /// Deletes the record unless a guard refuses. A refusal returns
    /// [`AppResponse::Conflict`] and leaves the collection unchanged.
    pub fn remove_guarded(&mut self, id: &str, guards: &[&dyn DeleteGuard<T>]) -> Result<bool, AppResponse> {
        let Some(index) = self.position(id) else {
            return Ok(false);
        };
        if let Some(reason) = guards.iter().find_map(|g| g.refusal(&self.records[index])) {
            info!("Delete of '{id}' from '{}' refused: {reason}", self.key);
            return Err(AppResponse::Conflict(reason));
        }

        let removed = self.records.remove(index);
        if let Err(e) = self.save() {
            self.records.insert(index, removed);
            return Err(e);
        }
        Ok(true)
    }

    /// Empties the collection and erases its key from the store. Safe to repeat.
    pub fn clear(&mut self) -> Result<(), AppResponse> {
        let erased = self.store.erase(&self.key)?;
        info!("Cleared '{}' ({} records, key erased: {erased})", self.key, self.records.len());
        self.records.clear();
        Ok(())
    }

    /// Adds a batch of records all-or-nothing. Returns how many were imported.
    pub fn import(&mut self, batch: Vec<T>, mode: ImportMode) -> Result<usize, AppResponse> {
        {
            let mut seen: HashSet<&str> = HashSet::new();
            if mode == ImportMode::Append {
                seen.extend(self.records.iter().map(|r| r.id()));
            }
            for record in &batch {
                check_id(record.id())?;
                if !seen.insert(record.id()) {
                    return Err(AppResponse::ValidationError(format!(
                        "Import rejected: duplicate id '{}'",
                        record.id()
                    )));
                }
            }
        }

        let count = batch.len();
        let next = match mode {
            ImportMode::Append => {
                let mut next = self.records.clone();
                next.extend(batch);
                next
            }
            ImportMode::Replace => batch,
        };
        self.store.write(&self.key, &encode(self.version, &next)?)?;
        self.records = next;
        info!("Imported {count} records into '{}' ({mode:?})", self.key);
        Ok(count)
    }

    pub fn query(&self, query: &Query) -> Vec<&T> {
        query_pipeline::query(&self.records, query)
    }

    pub fn aggregate(&self, metrics: &[MetricSpec]) -> AggregateResult {
        aggregate(&self.records, metrics)
    }

    pub fn to_csv(&self, columns: &[Column]) -> Result<String, AppResponse> {
        exporter::to_csv(&self.records, columns)
    }

    pub fn to_json(&self) -> Result<String, AppResponse> {
        exporter::to_json(&self.records)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }

    fn replace_at(&mut self, index: usize, updated: T) -> Result<(), AppResponse> {
        if updated.id() != self.records[index].id() {
            return Err(AppResponse::ValidationError(format!(
                "Record id '{}' cannot be changed",
                self.records[index].id()
            )));
        }
        let previous = std::mem::replace(&mut self.records[index], updated);
        if let Err(e) = self.save() {
            self.records[index] = previous;
            return Err(e);
        }
        Ok(())
    }
}

/// Applies a shallow JSON patch to a copy of `record`.
pub(crate) fn patched<T: Record>(record: &T, patch: JsonValue) -> Result<T, AppResponse> {
    let JsonValue::Object(changes) = patch else {
        return Err(AppResponse::BadRequest("Patch must be a JSON object".to_string()));
    };
    let mut value = serde_json::to_value(record)?;
    let Some(fields) = value.as_object_mut() else {
        return Err(AppResponse::SerializationError(
            "Record does not serialize to a JSON object".to_string(),
        ));
    };
    for (name, change) in changes {
        fields.insert(name, change);
    }
    Ok(serde_json::from_value(value)?)
}

fn check_id(id: &str) -> Result<(), AppResponse> {
    if id.trim().is_empty() {
        return Err(AppResponse::ValidationError("Record id cannot be empty".to_string()));
    }
    Ok(())
}

fn encode<T: Record>(version: u32, records: &[T]) -> Result<String, AppResponse> {
    Ok(serde_json::to_string(&Envelope { version, records })?)
}

/// Accepts the versioned envelope and the legacy bare array (version 0).
fn decode<T: Record>(text: &str, migrations: &Migrations) -> Result<(Vec<T>, u32), AppResponse> {
    let (version, raw) = match serde_json::from_str::<JsonValue>(text)? {
        JsonValue::Array(items) => (0, items),
        JsonValue::Object(mut envelope) => {
            let version = match envelope.get("version") {
                None => 0,
                Some(raw) => raw
                    .as_u64()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| {
                        AppResponse::SerializationError(format!("Invalid stored version: {raw}"))
                    })?,
            };
            match envelope.remove("records") {
                Some(JsonValue::Array(items)) => (version, items),
                _ => {
                    return Err(AppResponse::SerializationError(
                        "Stored object has no 'records' array".to_string(),
                    ))
                }
            }
        }
        _ => {
            return Err(AppResponse::SerializationError(
                "Stored value is not a collection".to_string(),
            ))
        }
    };

    let records = raw
        .into_iter()
        .map(|item| serde_json::from_value::<T>(migrations.upgrade(version, item)))
        .collect::<Result<Vec<T>, _>>()?;
    Ok((dedupe(records), version))
}

fn dedupe<T: Record>(records: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| {
            let fresh = seen.insert(r.id().to_string());
            if !fresh {
                warn!("Dropping record with duplicate id '{}'", r.id());
            }
            fresh
        })
        .collect()
}
