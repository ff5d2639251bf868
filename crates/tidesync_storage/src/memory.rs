//! In-memory storage adapter for testing.

use crate::adapter::StorageAdapter;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory storage adapter.
///
/// This adapter keeps every value in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Caches that don't need to survive a restart
///
/// # Thread Safety
///
/// This adapter is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use tidesync_storage::{InMemoryStorage, StorageAdapter};
///
/// let storage = InMemoryStorage::new();
/// storage.save("k", b"v").unwrap();
/// assert_eq!(storage.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    values: RwLock<HashMap<String, Vec<u8>>>,
    closed: AtomicBool,
}

impl InMemoryStorage {
    /// Creates a new empty in-memory adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an adapter with pre-existing values.
    ///
    /// Useful for testing hydration from a previous session.
    #[must_use]
    pub fn with_values(values: HashMap<String, Vec<u8>>) -> Self {
        Self {
            values: RwLock::new(values),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Closes or reopens the adapter.
    ///
    /// While closed every call fails with [`StorageError::Closed`], which lets
    /// tests exercise the engine's storage failure paths.
    pub fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::SeqCst);
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl StorageAdapter for InMemoryStorage {
    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.check_open()?;
        Ok(self.values.read().get(key).cloned())
    }

    fn save(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.check_open()?;
        self.values.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.check_open()?;
        self.values.write().remove(key);
        Ok(())
    }
}
