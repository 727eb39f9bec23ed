//! LMDB-backed durable store.
//!
//! One LMDB environment (a `<name>.lmdb` directory) holds every collection of
//! an application. Each collection key maps to the JSON text of the whole
//! collection, so a save is one `put` inside one write transaction and is
//! durable once the commit returns.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lmdb::{Cursor, Database, DatabaseFlags, Environment, Error as LmdbError, Transaction, WriteFlags};
use log::{debug, info, warn};

use crate::app_response::AppResponse;
use crate::durable_store::DurableStore;
use crate::store_config::StoreConfig;

/// Handle to an open LMDB environment. Cloning shares the environment.
#[derive(Clone)]
pub struct AppDbState {
    env: Arc<Environment>,
    db: Database,
    path: PathBuf,
}

impl AppDbState {
    /// Opens (or creates) `./<name>.lmdb` with default settings.
    pub fn init(name: String) -> Result<Self, AppResponse> {
        Self::open(&StoreConfig::new(name))
    }

    pub fn open(config: &StoreConfig) -> Result<Self, AppResponse> {
        let path = config.env_path();
        let existed = path.exists();
        fs::create_dir_all(&path)?;

        let env = Environment::new()
            .set_map_size(config.map_size)
            .open(&path)
            .map_err(|e| {
                warn!("Failed to open LMDB environment at {}: {e}", path.display());
                AppResponse::from(e)
            })?;
        let db = env.create_db(None, DatabaseFlags::empty())?;

        if existed {
            info!("Opened existing store at {}", path.display());
        } else {
            info!("Created new store at {}", path.display());
        }

        Ok(Self {
            env: Arc::new(env),
            db,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Erases every collection key in the environment. Returns how many were removed.
    pub fn clear_all_records(&self) -> Result<usize, AppResponse> {
        let mut txn = self.env.begin_rw_txn()?;
        let count = {
            let mut cursor = txn.open_ro_cursor(self.db)?;
            cursor.iter().count()
        };
        txn.clear_db(self.db)?;
        txn.commit()?;
        info!("Cleared {count} keys from {}", self.path.display());
        Ok(count)
    }

    /// Flushes the environment. LMDB closes it when the last clone is dropped.
    pub fn close_database(self) -> Result<(), AppResponse> {
        self.env.sync(true)?;
        info!("Store at {} synced and released", self.path.display());
        Ok(())
    }
}

impl DurableStore for AppDbState {
    fn read(&self, key: &str) -> Result<Option<String>, AppResponse> {
        let txn = self.env.begin_ro_txn()?;
        let text = match txn.get(self.db, &key) {
            Ok(bytes) => String::from_utf8(bytes.to_vec()).map_err(|e| {
                AppResponse::SerializationError(format!("Stored value for '{key}' is not UTF-8: {e}"))
            })?,
            Err(LmdbError::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        txn.commit()?;
        Ok(Some(text))
    }

    fn write(&self, key: &str, text: &str) -> Result<(), AppResponse> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.put(self.db, &key, &text, WriteFlags::empty())?;
        txn.commit()?;
        debug!("Wrote {} bytes to '{key}'", text.len());
        Ok(())
    }

    fn erase(&self, key: &str) -> Result<bool, AppResponse> {
        let mut txn = self.env.begin_rw_txn()?;
        match txn.del(self.db, &key, None) {
            Ok(()) => {
                txn.commit()?;
                Ok(true)
            }
            Err(LmdbError::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
