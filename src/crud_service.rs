//! Create / edit / delete flow shared by every entity type.
//!
//! Wraps a [`PersistentCollection`] with the entity's validators. Validation
//! runs on the candidate record before anything is written, so a rejected
//! create or edit leaves both memory and store untouched.

use log::debug;
use serde_json::Value as JsonValue;

use crate::app_response::AppResponse;
use crate::durable_store::DurableStore;
use crate::local_db_model::Record;
use crate::persistent_collection::{patched, PersistentCollection};
use crate::validation::{DeleteGuard, RecordValidator};

pub struct CrudService<T: Record, S: DurableStore> {
    collection: PersistentCollection<T, S>,
    validators: Vec<Box<dyn RecordValidator<T>>>,
}

impl<T: Record, S: DurableStore> CrudService<T, S> {
    pub fn new(collection: PersistentCollection<T, S>) -> Self {
        CrudService {
            collection,
            validators: Vec::new(),
        }
    }

    pub fn with_validator(mut self, validator: impl RecordValidator<T> + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn collection(&self) -> &PersistentCollection<T, S> {
        &self.collection
    }

    pub fn into_collection(self) -> PersistentCollection<T, S> {
        self.collection
    }

    /// Runs every validator and reports all field errors at once.
    pub fn validate(&self, record: &T) -> Result<(), AppResponse> {
        let errors: Vec<_> = self
            .validators
            .iter()
            .flat_map(|v| v.validate(record))
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            debug!("Record '{}' failed validation with {} errors", record.id(), errors.len());
            Err(AppResponse::InvalidFields(errors))
        }
    }

    pub fn create(&mut self, record: T) -> Result<(), AppResponse> {
        self.validate(&record)?;
        self.collection.add(record)
    }

    /// Applies `patch` if the patched record still validates. `Ok(false)` when `id` is unknown.
    pub fn edit(&mut self, id: &str, patch: JsonValue) -> Result<bool, AppResponse> {
        let Some(current) = self.collection.get(id) else {
            return Ok(false);
        };
        let candidate = patched(current, patch)?;
        self.validate(&candidate)?;
        self.collection.update_with(id, move |record| *record = candidate)
    }

    pub fn delete(&mut self, id: &str, guards: &[&dyn DeleteGuard<T>]) -> Result<bool, AppResponse> {
        self.collection.remove_guarded(id, guards)
    }

    pub fn clear_all(&mut self) -> Result<(), AppResponse> {
        self.collection.clear()
    }
}
