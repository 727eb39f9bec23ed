//! The durable key-value text store that collections mirror themselves into.
//!
//! A store maps application-chosen key names (`"bookings"`, `"todos_v3"`) to
//! the JSON text of a whole collection. Writes are synchronous: when `write`
//! returns `Ok`, the text is durable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::app_response::AppResponse;

pub trait DurableStore {
    /// Returns the text stored under `key`, or `None` if the key was never written.
    fn read(&self, key: &str) -> Result<Option<String>, AppResponse>;

    fn write(&self, key: &str, text: &str) -> Result<(), AppResponse>;

    /// Removes `key`. Returns whether something was removed.
    fn erase(&self, key: &str) -> Result<bool, AppResponse>;
}

impl<S: DurableStore + ?Sized> DurableStore for &S {
    fn read(&self, key: &str) -> Result<Option<String>, AppResponse> {
        (**self).read(key)
    }

    fn write(&self, key: &str, text: &str) -> Result<(), AppResponse> {
        (**self).write(key, text)
    }

    fn erase(&self, key: &str) -> Result<bool, AppResponse> {
        (**self).erase(key)
    }
}

impl<S: DurableStore + ?Sized> DurableStore for Arc<S> {
    fn read(&self, key: &str) -> Result<Option<String>, AppResponse> {
        (**self).read(key)
    }

    fn write(&self, key: &str, text: &str) -> Result<(), AppResponse> {
        (**self).write(key, text)
    }

    fn erase(&self, key: &str) -> Result<bool, AppResponse> {
        (**self).erase(key)
    }
}

/// Process-local store for hosts without a writable disk, and for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with raw text, e.g. data left behind by an older app version.
    pub fn with_entry(key: &str, text: &str) -> Self {
        let store = Self::default();
        if let Ok(mut entries) = store.entries.lock() {
            entries.insert(key.to_string(), text.to_string());
        }
        store
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> AppResponse {
        AppResponse::DatabaseError("Memory store lock poisoned".to_string())
    }
}

impl DurableStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, AppResponse> {
        let entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, text: &str) -> Result<(), AppResponse> {
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        debug!("memory store: writing {} bytes to '{key}'", text.len());
        entries.insert(key.to_string(), text.to_string());
        Ok(())
    }

    fn erase(&self, key: &str) -> Result<bool, AppResponse> {
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        Ok(entries.remove(key).is_some())
    }
}
