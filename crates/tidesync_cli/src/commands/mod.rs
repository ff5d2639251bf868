//! CLI command implementations.

pub mod clear;
pub mod hash;
pub mod inspect;
pub mod pending;

use std::path::Path;
use std::sync::Arc;
use tidesync_engine::{Dataset, DatasetRegistry};
use tidesync_storage::FileStorage;
use tracing::debug;

/// Result type shared by the commands.
pub type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Opens a registry over an existing cache directory.
pub fn open_registry(path: &Path) -> CommandResult<DatasetRegistry> {
    if !path.is_dir() {
        return Err(format!("No cache found at {:?}", path).into());
    }
    debug!(path = %path.display(), "opening cache");
    let storage = FileStorage::open(path)?;
    Ok(DatasetRegistry::new(Arc::new(storage)))
}

/// Loads a dataset snapshot from the cache at `path`.
pub fn load_dataset(path: &Path, dataset_id: &str) -> CommandResult<Dataset> {
    let registry = open_registry(path)?;
    match registry.load(dataset_id)? {
        Some(dataset) => Ok(dataset),
        None => Err(format!("No dataset {:?} in {:?}", dataset_id, path).into()),
    }
}

/// Formats a millisecond timestamp for display.
pub fn format_millis(millis: Option<i64>) -> Option<String> {
    millis
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|time| time.to_rfc3339())
}
