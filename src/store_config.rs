//! Configuration for the LMDB-backed durable store.

use std::path::PathBuf;

use serde::Deserialize;

use crate::app_response::AppResponse;

/// Default LMDB map size: 10 MiB, plenty for collections of a few hundred records.
pub const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Environment name; the store lives in `<directory>/<name>.lmdb`.
    pub name: String,
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_map_size")]
    pub map_size: usize,
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_map_size() -> usize {
    DEFAULT_MAP_SIZE
}

impl StoreConfig {
    pub fn new(name: impl Into<String>) -> Self {
        StoreConfig {
            name: name.into(),
            directory: default_directory(),
            map_size: DEFAULT_MAP_SIZE,
        }
    }

    pub fn in_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_map_size(mut self, map_size: usize) -> Self {
        self.map_size = map_size;
        self
    }

    /// Parses a config object such as `{"name":"bookings","directory":"/data"}`.
    ///
    /// A bare string that is not JSON is taken as the environment name, so
    /// hosts that only pass a name keep working.
    pub fn from_json(text: &str) -> Result<Self, AppResponse> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(AppResponse::BadRequest("Empty store configuration".to_string()));
        }
        if !trimmed.starts_with('{') {
            return Ok(StoreConfig::new(trimmed));
        }

        let config: StoreConfig = serde_json::from_str(trimmed)?;
        if config.name.trim().is_empty() {
            return Err(AppResponse::ValidationError("Store name cannot be empty".to_string()));
        }
        if config.map_size == 0 {
            return Err(AppResponse::ValidationError("map_size must be positive".to_string()));
        }
        Ok(config)
    }

    /// Directory holding the LMDB data and lock files.
    pub fn env_path(&self) -> PathBuf {
        self.directory.join(format!("{}.lmdb", self.name))
    }
}
