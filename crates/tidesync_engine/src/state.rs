//! Engine state shared by every dataset of one client.

use crate::config::Config;
use crate::error::{SyncError, SyncResult};
use crate::notify::{Notification, NotificationCode, Notifier};
use crate::registry::DatasetRegistry;
use crate::uid_map::UidMap;
use serde_json::Value;
use std::sync::Arc;
use tidesync_storage::StorageAdapter;

/// Everything one client owns, guarded by a single lock.
///
/// Nothing in here awaits. The lock is taken for a synchronous step of a
/// sync loop or a public call and released before any network I/O.
#[derive(Debug)]
pub(crate) struct EngineState {
    /// Defaults for datasets managed from now on.
    pub config: Config,
    pub registry: DatasetRegistry,
    pub uid_map: UidMap,
    pub notifier: Notifier,
}

impl EngineState {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            config: Config::default(),
            registry: DatasetRegistry::new(storage),
            uid_map: UidMap::new(),
            notifier: Notifier::new(),
        }
    }

    /// Queues a notification, filtered by the dataset's configuration, or the
    /// client defaults if the dataset is not held in memory.
    pub fn notify(
        &mut self,
        dataset_id: &str,
        uid: Option<String>,
        code: NotificationCode,
        message: impl Into<Value>,
    ) {
        let config = self
            .registry
            .find(dataset_id)
            .map(|d| &d.config)
            .unwrap_or(&self.config);
        self.notifier.emit(
            config,
            Notification {
                dataset_id: dataset_id.to_string(),
                uid,
                code,
                message: message.into(),
            },
        );
    }

    /// Saves a dataset, reporting failures through a notification.
    pub fn persist(&mut self, dataset_id: &str) -> SyncResult<()> {
        let result = self.registry.save(dataset_id);
        if let Err(err) = &result {
            self.report_storage_failure(dataset_id, err);
        }
        result
    }

    /// Emits the notification matching a storage error.
    pub fn report_storage_failure(&mut self, dataset_id: &str, err: &SyncError) {
        let code = match err {
            SyncError::Storage(e) if e.is_connection_failure() => {
                NotificationCode::ConnectionToStorageFailed
            }
            SyncError::Storage(_) | SyncError::Codec(_) => NotificationCode::ClientStorageFailed,
            _ => return,
        };
        self.notify(dataset_id, None, code, err.to_string());
    }
}
