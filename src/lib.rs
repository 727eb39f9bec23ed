//! # Local Collection Core
//!
//! Local-first record collections for dashboard-style applications: an
//! ordered list of records per entity type, mirrored to an LMDB key-value
//! store on every change, with search/filter/sort views, summary metrics and
//! CSV/JSON export.
//!
//! ## Building blocks
//!
//! - [`persistent_collection::PersistentCollection`] - authoritative list, hydrated from and saved to a [`durable_store::DurableStore`]
//! - [`query_pipeline::query`] - search + AND filters + stable sort, returning a borrowed view
//! - [`derived_aggregator::aggregate`] - counts, sums, averages, percentages and groupings
//! - [`exporter`] - CSV/JSON export and import
//! - [`crud_service::CrudService`] - validated create/edit and guarded delete
//! - [`assistant_reply::AssistantReply`] - tagged parse of AI assistant replies
//!
//! ## Quick Start
//!
//! ```no_run
//! use local_collection_core::derived_aggregator::{Metric, MetricSpec};
//! use local_collection_core::local_db_model::JsonRecord;
//! use local_collection_core::local_db_state::AppDbState;
//! use local_collection_core::persistent_collection::PersistentCollection;
//!
//! let db = AppDbState::init("restaurant".to_string())?;
//! let mut customers: PersistentCollection<JsonRecord, _> =
//!     PersistentCollection::load(db, "customers", Vec::new());
//!
//! customers.add(JsonRecord::new("c1").with("name", "Ana").with("status", "Lapsed 3M"))?;
//!
//! let stats = customers.aggregate(&[MetricSpec::new("total", Metric::Count)]);
//! assert_eq!(stats.number("total"), Some(1.0));
//! # Ok::<(), local_collection_core::app_response::AppResponse>(())
//! ```
//!
//! ## FFI Functions
//!
//! Hosts drive collections of [`local_db_model::JsonRecord`] through C-compatible
//! functions exchanging null-terminated UTF-8 JSON. Every string returned is
//! an [`app_response::AppResponse`] and must be released with [`free_c_string`].
//!
//! - [`create_db`] / [`close_database`] - open and release the LMDB environment
//! - [`open_collection`] / [`close_collection`] - hydrate one collection key
//! - [`get_all`], [`get_by_id`], [`push_data`], [`update_data`], [`delete_by_id`], [`clear_all_records`]
//! - [`import_data`] - CSV or JSON file contents, all-or-nothing
//! - [`query_records`], [`aggregate_records`], [`export_csv`], [`export_json`]

pub mod app_response;
pub mod assistant_reply;
pub mod crud_service;
pub mod derived_aggregator;
pub mod durable_store;
pub mod exporter;
pub mod field_value;
pub mod local_db_model;
pub mod local_db_state;
pub mod migration;
pub mod persistent_collection;
pub mod query_pipeline;
pub mod store_config;
pub mod validation;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};
use serde::Deserialize;

use crate::app_response::AppResponse;
use crate::derived_aggregator::MetricSpec;
use crate::exporter::{Column, ImportFormat};
use crate::local_db_model::JsonRecord;
use crate::local_db_state::AppDbState;
use crate::persistent_collection::{ImportMode, PersistentCollection};
use crate::query_pipeline::Query;
use crate::store_config::StoreConfig;

/// Collection type driven through the C bridge.
pub type JsonCollection = PersistentCollection<JsonRecord, AppDbState>;

#[derive(Debug, Deserialize)]
struct ImportRequest {
    format: ImportFormat,
    text: String,
    #[serde(default)]
    mode: ImportMode,
    #[serde(default)]
    columns: Vec<Column>,
}

#[derive(Debug, Deserialize)]
struct AggregateRequest {
    #[serde(default)]
    query: Option<Query>,
    metrics: Vec<MetricSpec>,
}

#[derive(Debug, Deserialize)]
struct ExportRequest {
    #[serde(default)]
    query: Option<Query>,
    #[serde(default)]
    columns: Vec<Column>,
}

/// Opens (or creates) the LMDB environment described by `config`.
///
/// # Parameters
///
/// * `config` - Null-terminated JSON such as `{"name":"meals","directory":"/data"}`,
///   or just a bare environment name
///
/// # Returns
///
/// A pointer to the [`AppDbState`] on success, or null when the pointer is
/// null, the text is not valid UTF-8 or configuration, or LMDB fails to open.
/// Release it with [`close_database`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use local_collection_core::create_db;
///
/// let config = CString::new(r#"{"name":"meal_planner"}"#).unwrap();
/// let db_state = create_db(config.as_ptr());
/// assert!(!db_state.is_null());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_db(config: *const c_char) -> *mut AppDbState {
    if config.is_null() {
        warn!("Null config pointer passed to create_db");
        return std::ptr::null_mut();
    }

    let config_str = match unsafe { CStr::from_ptr(config).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in config parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    let config = match StoreConfig::from_json(config_str) {
        Ok(c) => c,
        Err(e) => {
            warn!("Rejected store configuration: {e}");
            return std::ptr::null_mut();
        }
    };

    match AppDbState::open(&config) {
        Ok(state) => {
            info!("Store ready at {}", state.path().display());
            Box::into_raw(Box::new(state))
        }
        Err(e) => {
            warn!("Failed to initialize store at {}: {e}", config.env_path().display());
            std::ptr::null_mut()
        }
    }
}

/// Syncs and releases an environment returned by [`create_db`].
///
/// Collections opened from it keep their own handle on the environment and
/// stay usable until they are closed.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_database(db_state: *mut AppDbState) -> *const c_char {
    if db_state.is_null() {
        let error = AppResponse::BadRequest("Null state pointer passed to close_database".to_string());
        return response_to_c_string(&error);
    }

    let state = unsafe { Box::from_raw(db_state) };
    match state.close_database() {
        Ok(()) => response_to_c_string(&AppResponse::success("Database connection closed successfully")),
        Err(e) => response_to_c_string(&e),
    }
}

/// Hydrates the collection stored under `key`.
///
/// # Parameters
///
/// * `db_state` - Environment from [`create_db`]
/// * `key` - Collection key, e.g. `"bookings"`
/// * `seed_json` - Optional JSON array of default records used when nothing
///   usable is stored; may be null
///
/// # Returns
///
/// A collection handle, or null on a null/invalid argument. Malformed stored
/// data is not an error: the seed (or an empty collection) is used instead.
/// Release the handle with [`close_collection`].
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn open_collection(
    db_state: *mut AppDbState,
    key: *const c_char,
    seed_json: *const c_char,
) -> *mut JsonCollection {
    let Some(state) = (unsafe { db_state.as_ref() }) else {
        warn!("Null state pointer passed to open_collection");
        return std::ptr::null_mut();
    };

    let key = match c_ptr_to_string(key, "key") {
        Ok(k) if !k.trim().is_empty() => k,
        Ok(_) => {
            warn!("Empty collection key passed to open_collection");
            return std::ptr::null_mut();
        }
        Err(error_ptr) => {
            free_c_string(error_ptr as *mut c_char);
            return std::ptr::null_mut();
        }
    };

    let seed = if seed_json.is_null() {
        Vec::new()
    } else {
        let parsed = c_ptr_to_string(seed_json, "seed")
            .map_err(|error_ptr| free_c_string(error_ptr as *mut c_char))
            .ok()
            .map(|text| exporter::from_json::<JsonRecord>(&text));
        match parsed {
            Some(Ok(records)) => records,
            Some(Err(e)) => {
                warn!("Ignoring invalid seed for '{key}': {e}");
                Vec::new()
            }
            None => Vec::new(),
        }
    };

    let collection = PersistentCollection::load(state.clone(), &key, seed);
    Box::into_raw(Box::new(collection))
}

/// Releases a handle returned by [`open_collection`]. Data stays in the store.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_collection(handle: *mut JsonCollection) -> *const c_char {
    if handle.is_null() {
        let error = AppResponse::BadRequest("Null collection pointer passed to close_collection".to_string());
        return response_to_c_string(&error);
    }
    let collection = unsafe { Box::from_raw(handle) };
    let message = format!("Collection '{}' closed", collection.key());
    drop(collection);
    response_to_c_string(&AppResponse::success(message))
}

/// Returns every record, in collection order, as a JSON array.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_all(handle: *mut JsonCollection) -> *const c_char {
    with_collection(handle, "get_all", |collection| {
        Ok(serde_json::to_string(collection.records())?)
    })
}

/// Returns one record, or `NotFound`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_by_id(handle: *mut JsonCollection, id: *const c_char) -> *const c_char {
    let id = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(error_ptr) => return error_ptr,
    };
    with_collection(handle, "get_by_id", |collection| match collection.get(&id) {
        Some(record) => Ok(serde_json::to_string(record)?),
        None => Err(AppResponse::NotFound(format!("No record found with id: {id}"))),
    })
}

/// Appends a record.
///
/// Expected JSON: an object with a non-empty string `id` plus any fields,
/// e.g. `{"id":"m1","name":"Pancakes","calories":350}`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn push_data(handle: *mut JsonCollection, json_ptr: *const c_char) -> *const c_char {
    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(error_ptr) => return error_ptr,
    };
    with_collection_mut(handle, "push_data", |collection| {
        let value: serde_json::Value = serde_json::from_str(&json_str)
            .map_err(|e| AppResponse::SerializationError(format!("Invalid JSON: {e}")))?;
        let record = JsonRecord::from_value(value)?;
        let json = serde_json::to_string(&record)?;
        collection.add(record)?;
        Ok(json)
    })
}

/// Replaces the fields given in `patch_ptr` on the record `id`.
///
/// A missing id answers `NotFound` and changes nothing.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn update_data(
    handle: *mut JsonCollection,
    id: *const c_char,
    patch_ptr: *const c_char,
) -> *const c_char {
    let id = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(error_ptr) => return error_ptr,
    };
    let patch_str = match c_ptr_to_string(patch_ptr, "patch") {
        Ok(patch) => patch,
        Err(error_ptr) => return error_ptr,
    };
    with_collection_mut(handle, "update_data", |collection| {
        let patch: serde_json::Value = serde_json::from_str(&patch_str)
            .map_err(|e| AppResponse::SerializationError(format!("Invalid patch JSON: {e}")))?;
        if !collection.update(&id, patch)? {
            return Err(AppResponse::NotFound(format!("No record found with id: {id}")));
        }
        match collection.get(&id) {
            Some(record) => Ok(serde_json::to_string(record)?),
            None => Err(AppResponse::NotFound(format!("No record found with id: {id}"))),
        }
    })
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn delete_by_id(handle: *mut JsonCollection, id: *const c_char) -> *const c_char {
    let id = match c_ptr_to_string(id, "id") {
        Ok(id) => id,
        Err(error_ptr) => return error_ptr,
    };
    with_collection_mut(handle, "delete_by_id", |collection| {
        if collection.remove(&id)? {
            Ok("Record deleted successfully".to_string())
        } else {
            Err(AppResponse::NotFound(format!("No record found with id: {id}")))
        }
    })
}

/// Empties the collection and erases its key. Calling it again is harmless.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn clear_all_records(handle: *mut JsonCollection) -> *const c_char {
    with_collection_mut(handle, "clear_all_records", |collection| {
        collection.clear()?;
        Ok("All records cleared successfully".to_string())
    })
}

/// Imports an uploaded file.
///
/// Expected JSON:
/// ```json
/// { "format": "csv", "mode": "append", "text": "id,name\n1,Acme",
///   "columns": [{ "label": "id", "field": "id" }] }
/// ```
/// The batch is applied entirely or not at all; the response carries the
/// number of imported records.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn import_data(handle: *mut JsonCollection, request_ptr: *const c_char) -> *const c_char {
    let request_str = match c_ptr_to_string(request_ptr, "request") {
        Ok(r) => r,
        Err(error_ptr) => return error_ptr,
    };
    with_collection_mut(handle, "import_data", |collection| {
        let request: ImportRequest = serde_json::from_str(&request_str)?;
        let batch = exporter::parse_import::<JsonRecord>(request.format, &request.text, &request.columns)?;
        let count = collection.import(batch, request.mode)?;
        Ok(count.to_string())
    })
}

/// Runs a [`Query`] and returns the matching records as a JSON array.
///
/// Expected JSON, every part optional:
/// ```json
/// { "search": "acme", "search_fields": ["name"],
///   "filters": [{ "field": "status", "op": "equals", "value": "Paid" }],
///   "sort": { "field": "amount", "direction": "desc" } }
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn query_records(handle: *mut JsonCollection, query_ptr: *const c_char) -> *const c_char {
    let query_str = match c_ptr_to_string(query_ptr, "query") {
        Ok(q) => q,
        Err(error_ptr) => return error_ptr,
    };
    with_collection(handle, "query_records", |collection| {
        let query: Query = serde_json::from_str(&query_str)?;
        Ok(serde_json::to_string(&collection.query(&query))?)
    })
}

/// Computes metrics, optionally over a filtered view.
///
/// Expected JSON: `{"query": {...}, "metrics": [{"name":"total","kind":"count"}]}`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn aggregate_records(handle: *mut JsonCollection, request_ptr: *const c_char) -> *const c_char {
    let request_str = match c_ptr_to_string(request_ptr, "request") {
        Ok(r) => r,
        Err(error_ptr) => return error_ptr,
    };
    with_collection(handle, "aggregate_records", |collection| {
        let request: AggregateRequest = serde_json::from_str(&request_str)?;
        let result = match &request.query {
            Some(query) => derived_aggregator::aggregate(collection.query(query), &request.metrics),
            None => collection.aggregate(&request.metrics),
        };
        Ok(serde_json::to_string(&result)?)
    })
}

/// Renders records as CSV text. Expected JSON: `{"columns": [...], "query": {...}}`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn export_csv(handle: *mut JsonCollection, request_ptr: *const c_char) -> *const c_char {
    let request_str = match c_ptr_to_string(request_ptr, "request") {
        Ok(r) => r,
        Err(error_ptr) => return error_ptr,
    };
    with_collection(handle, "export_csv", |collection| {
        let request: ExportRequest = serde_json::from_str(&request_str)?;
        if request.columns.is_empty() {
            return Err(AppResponse::BadRequest("CSV export needs at least one column".to_string()));
        }
        match &request.query {
            Some(query) => exporter::to_csv(collection.query(query), &request.columns),
            None => collection.to_csv(&request.columns),
        }
    })
}

/// Renders records as pretty-printed JSON. `query_ptr` may be null to export everything.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn export_json(handle: *mut JsonCollection, query_ptr: *const c_char) -> *const c_char {
    let query = if query_ptr.is_null() {
        None
    } else {
        match c_ptr_to_string(query_ptr, "query") {
            Ok(q) => Some(q),
            Err(error_ptr) => return error_ptr,
        }
    };
    with_collection(handle, "export_json", |collection| match &query {
        Some(text) => {
            let query: Query = serde_json::from_str(text)?;
            exporter::to_json(collection.query(&query))
        }
        None => collection.to_json(),
    })
}

/// Releases a string returned by any function of this bridge. Null is ignored.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_c_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(ptr));
    }
}

fn with_collection<F>(handle: *mut JsonCollection, fn_name: &str, op: F) -> *const c_char
where
    F: FnOnce(&JsonCollection) -> Result<String, AppResponse>,
{
    match unsafe { handle.as_ref() } {
        Some(collection) => respond(op(collection)),
        None => {
            let error = AppResponse::BadRequest(format!("Null collection pointer passed to {fn_name}"));
            response_to_c_string(&error)
        }
    }
}

fn with_collection_mut<F>(handle: *mut JsonCollection, fn_name: &str, op: F) -> *const c_char
where
    F: FnOnce(&mut JsonCollection) -> Result<String, AppResponse>,
{
    match unsafe { handle.as_mut() } {
        Some(collection) => respond(op(collection)),
        None => {
            let error = AppResponse::BadRequest(format!("Null collection pointer passed to {fn_name}"));
            response_to_c_string(&error)
        }
    }
}

fn respond(result: Result<String, AppResponse>) -> *const c_char {
    match result {
        Ok(payload) => response_to_c_string(&AppResponse::Ok(payload)),
        Err(e) => response_to_c_string(&e),
    }
}

/// Serializes an [`AppResponse`] into a newly allocated C string.
///
/// Returns null if serialization or C string creation fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust String.
///
/// # Returns
///
/// * `Ok(String)` - If conversion was successful
/// * `Err(*const c_char)` - A `BadRequest` response, already converted, for
///   null pointers and invalid UTF-8
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
