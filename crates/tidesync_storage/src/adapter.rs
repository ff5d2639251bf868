//! Storage adapter trait definition.

use crate::error::StorageResult;

/// Prefix of every dataset snapshot key.
pub const DATASET_KEY_PREFIX: &str = "dataset_";

/// Returns the storage key for a dataset snapshot.
pub fn dataset_key(dataset_id: &str) -> String {
    format!("{DATASET_KEY_PREFIX}{dataset_id}")
}

/// A durable key-value store for dataset snapshots.
///
/// Adapters are **opaque byte stores**. The engine serializes each dataset
/// and hands the bytes over; adapters never interpret them.
///
/// # Invariants
///
/// - `load` returns exactly the bytes of the last successful `save` for a key
/// - `load` of a key that was never saved (or was removed) returns `None`
/// - `remove` of a missing key succeeds
/// - Each call is a scoped acquisition: whatever the adapter opens for the
///   call is released before it returns, on success and on error
///
/// # Implementors
///
/// - [`super::InMemoryStorage`] - For testing
/// - [`super::FileStorage`] - For persistent caches
pub trait StorageAdapter: Send + Sync {
    /// Loads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Open`] if the store cannot be reached,
    /// or another variant if the read itself fails.
    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// After this returns successfully the value survives process restarts
    /// (for durable adapters).
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be written.
    fn save(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value exists but cannot be removed.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

impl<S: StorageAdapter + ?Sized> StorageAdapter for std::sync::Arc<S> {
    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        (**self).load(key)
    }

    fn save(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        (**self).save(key, value)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        (**self).remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_key_prefixes_id() {
        assert_eq!(dataset_key("todos"), "dataset_todos");
        assert_eq!(dataset_key(""), "dataset_");
    }
}
