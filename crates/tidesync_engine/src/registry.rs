//! Managed datasets and their durable snapshots.

use crate::dataset::Dataset;
use crate::error::{SyncError, SyncResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tidesync_storage::{dataset_key, StorageAdapter};
use tracing::{debug, warn};

/// Owns the in-memory datasets and reads and writes their snapshots.
pub struct DatasetRegistry {
    datasets: HashMap<String, Dataset>,
    storage: Arc<dyn StorageAdapter>,
}

impl DatasetRegistry {
    /// Creates an empty registry backed by `storage`.
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            datasets: HashMap::new(),
            storage,
        }
    }

    /// Returns true if the dataset is held in memory.
    pub fn contains(&self, dataset_id: &str) -> bool {
        self.datasets.contains_key(dataset_id)
    }

    /// Returns the dataset held in memory.
    pub fn get(&self, dataset_id: &str) -> SyncResult<&Dataset> {
        self.datasets
            .get(dataset_id)
            .ok_or_else(|| SyncError::UnknownDataset(dataset_id.to_string()))
    }

    /// Returns the dataset held in memory, mutably.
    pub fn get_mut(&mut self, dataset_id: &str) -> SyncResult<&mut Dataset> {
        self.datasets
            .get_mut(dataset_id)
            .ok_or_else(|| SyncError::UnknownDataset(dataset_id.to_string()))
    }

    /// Returns the dataset if it is held in memory.
    pub fn find(&self, dataset_id: &str) -> Option<&Dataset> {
        self.datasets.get(dataset_id)
    }

    /// Puts a dataset in memory, replacing any previous one.
    pub fn insert(&mut self, dataset_id: impl Into<String>, dataset: Dataset) {
        self.datasets.insert(dataset_id.into(), dataset);
    }

    /// Drops a dataset from memory only.
    pub fn evict(&mut self, dataset_id: &str) -> Option<Dataset> {
        self.datasets.remove(dataset_id)
    }

    /// Returns the ids held in memory, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.datasets.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Iterates over every dataset held in memory.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Dataset)> {
        self.datasets.iter_mut()
    }

    /// Writes the dataset's snapshot.
    pub fn save(&self, dataset_id: &str) -> SyncResult<()> {
        let dataset = self.get(dataset_id)?;
        let bytes = dataset.to_snapshot()?;
        self.storage
            .save(&dataset_key(dataset_id), &bytes)
            .inspect_err(|e| warn!(dataset_id, error = %e, "failed to save dataset"))?;
        debug!(dataset_id, bytes = bytes.len(), "dataset saved");
        Ok(())
    }

    /// Reads a snapshot without putting it in memory.
    pub fn load(&self, dataset_id: &str) -> SyncResult<Option<Dataset>> {
        let bytes = self
            .storage
            .load(&dataset_key(dataset_id))
            .inspect_err(|e| warn!(dataset_id, error = %e, "failed to load dataset"))?;
        match bytes {
            Some(bytes) => {
                debug!(dataset_id, bytes = bytes.len(), "dataset loaded");
                Dataset::from_snapshot(&bytes).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Deletes the dataset's snapshot.
    pub fn remove_stored(&self, dataset_id: &str) -> SyncResult<()> {
        self.storage.remove(&dataset_key(dataset_id))?;
        Ok(())
    }

    /// Returns the storage adapter.
    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }
}

impl fmt::Debug for DatasetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetRegistry")
            .field("datasets", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidesync_storage::{InMemoryStorage, StorageError};

    fn registry() -> (DatasetRegistry, Arc<InMemoryStorage>) {
        let storage = Arc::new(InMemoryStorage::new());
        (DatasetRegistry::new(storage.clone()), storage)
    }

    #[test]
    fn unknown_dataset() {
        let (mut registry, _) = registry();
        assert!(matches!(registry.get("nope"), Err(SyncError::UnknownDataset(id)) if id == "nope"));
        assert!(registry.get_mut("nope").is_err());
        assert!(registry.save("nope").is_err());
    }

    #[test]
    fn save_then_load() {
        let (mut registry, storage) = registry();
        let mut dataset = Dataset::default();
        dataset.initialised = true;
        dataset.hash = Some("H".into());
        registry.insert("todos", dataset);
        registry.save("todos").unwrap();

        assert_eq!(storage.keys(), vec!["dataset_todos".to_string()]);
        let loaded = registry.load("todos").unwrap().unwrap();
        assert_eq!(loaded.hash.as_deref(), Some("H"));
        assert!(!loaded.initialised);
    }

    #[test]
    fn missing_snapshot_loads_as_none() {
        let (registry, _) = registry();
        assert!(registry.load("todos").unwrap().is_none());
    }

    #[test]
    fn storage_errors_surface() {
        let (mut registry, storage) = registry();
        registry.insert("todos", Dataset::default());
        storage.set_closed(true);

        let err = registry.save("todos").unwrap_err();
        assert!(matches!(err, SyncError::Storage(StorageError::Closed)));
        assert!(registry.load("todos").is_err());
    }

    #[test]
    fn evict_and_remove_stored() {
        let (mut registry, storage) = registry();
        registry.insert("b", Dataset::default());
        registry.insert("a", Dataset::default());
        registry.save("a").unwrap();
        assert_eq!(registry.ids(), vec!["a".to_string(), "b".to_string()]);

        assert!(registry.evict("a").is_some());
        assert!(!registry.contains("a"));
        registry.remove_stored("a").unwrap();
        assert!(storage.is_empty());
    }
}
