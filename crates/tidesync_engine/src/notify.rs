//! Notification fan-out.
//!
//! Events are queued while the engine state is locked and handed to the
//! application later, outside the lock, so a callback may call back into
//! the client without deadlocking.

use crate::config::Config;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Application callback receiving notifications.
pub type NotifyCallback = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Kinds of events reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCode {
    /// A snapshot could not be loaded or saved.
    ClientStorageFailed,
    /// The storage backend itself is unreachable.
    ConnectionToStorageFailed,
    /// A sync cycle began.
    SyncStarted,
    /// A sync cycle finished.
    SyncComplete,
    /// A local change was made while offline.
    OfflineUpdate,
    /// The authority rejected a change because its `pre` was stale.
    CollisionDetected,
    /// The authority rejected a change for another reason.
    RemoteUpdateFailed,
    /// A local change was applied to the cache.
    LocalUpdateApplied,
    /// The authority applied a change.
    RemoteUpdateApplied,
    /// A record-level delta was applied.
    DeltaReceived,
    /// One record changed as part of a delta.
    RecordDeltaReceived,
    /// A sync cycle failed.
    SyncFailed,
}

impl NotificationCode {
    /// Returns the wire name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCode::ClientStorageFailed => "client_storage_failed",
            NotificationCode::ConnectionToStorageFailed => "connection_to_storage_failed",
            NotificationCode::SyncStarted => "sync_started",
            NotificationCode::SyncComplete => "sync_complete",
            NotificationCode::OfflineUpdate => "offline_update",
            NotificationCode::CollisionDetected => "collision_detected",
            NotificationCode::RemoteUpdateFailed => "remote_update_failed",
            NotificationCode::LocalUpdateApplied => "local_update_applied",
            NotificationCode::RemoteUpdateApplied => "remote_update_applied",
            NotificationCode::DeltaReceived => "delta_received",
            NotificationCode::RecordDeltaReceived => "record_delta_received",
            NotificationCode::SyncFailed => "sync_failed",
        }
    }
}

impl fmt::Display for NotificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event delivered to the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Dataset the event belongs to.
    pub dataset_id: String,
    /// Record uid, change hash, or dataset hash, depending on the code.
    pub uid: Option<String>,
    /// The event kind.
    pub code: NotificationCode,
    /// Code-specific detail.
    pub message: Value,
}

/// Routes notifications to registered callbacks.
#[derive(Default)]
pub struct Notifier {
    global: Option<NotifyCallback>,
    per_dataset: HashMap<String, NotifyCallback>,
    queue: VecDeque<(NotifyCallback, Notification)>,
}

impl Notifier {
    /// Creates a notifier with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the callback used for datasets without their own.
    pub fn set_global(&mut self, callback: NotifyCallback) {
        self.global = Some(callback);
    }

    /// Registers a callback for one dataset.
    pub fn set_dataset(&mut self, dataset_id: impl Into<String>, callback: NotifyCallback) {
        self.per_dataset.insert(dataset_id.into(), callback);
    }

    /// Drops the callback registered for a dataset.
    pub fn remove_dataset(&mut self, dataset_id: &str) {
        self.per_dataset.remove(dataset_id);
    }

    /// Queues a notification if `config` enables its code and a callback
    /// is registered. Returns true if it was queued.
    ///
    /// The callback is chosen now, so re-registering later does not
    /// redirect events already queued.
    pub fn emit(&mut self, config: &Config, notification: Notification) -> bool {
        if !config.notifies(notification.code) {
            return false;
        }
        let callback = self
            .per_dataset
            .get(&notification.dataset_id)
            .or(self.global.as_ref());
        match callback {
            Some(callback) => {
                self.queue.push_back((Arc::clone(callback), notification));
                true
            }
            None => false,
        }
    }

    /// Returns the number of queued notifications.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Takes every queued notification, in emission order.
    pub fn drain(&mut self) -> Vec<(NotifyCallback, Notification)> {
        self.queue.drain(..).collect()
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("global", &self.global.is_some())
            .field("datasets", &self.per_dataset.len())
            .field("queued", &self.queue.len())
            .finish()
    }
}

/// Invokes drained callbacks. Must be called without the engine lock held.
pub(crate) fn deliver(batch: Vec<(NotifyCallback, Notification)>) {
    for (callback, notification) in batch {
        callback(&notification);
    }
}
