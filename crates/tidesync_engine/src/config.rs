//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use crate::notify::NotificationCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Default path appended to the cloud URL for sync calls.
pub const DEFAULT_CLOUD_PATH: &str = "/mbaas/sync/";

/// Configuration for sync operations.
///
/// The same type is used for the client-wide defaults and for each dataset's
/// effective configuration. Unknown keys are kept in `extra` and forwarded to
/// the authority untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between sync cycles for a dataset.
    pub sync_frequency: u64,
    /// Mark the dataset for sync whenever a local change is enqueued.
    pub auto_sync_local_updates: bool,
    /// Deliver `client_storage_failed` notifications.
    pub notify_client_storage_failed: bool,
    /// Deliver `connection_to_storage_failed` notifications.
    pub notify_connection_to_storage_failed: bool,
    /// Deliver `sync_started` notifications.
    pub notify_sync_started: bool,
    /// Deliver `sync_complete` notifications.
    pub notify_sync_complete: bool,
    /// Deliver `offline_update` notifications.
    pub notify_offline_update: bool,
    /// Deliver `collision_detected` notifications.
    pub notify_collision_detected: bool,
    /// Deliver `remote_update_failed` notifications.
    pub notify_remote_update_failed: bool,
    /// Deliver `local_update_applied` notifications.
    pub notify_local_update_applied: bool,
    /// Deliver `remote_update_applied` notifications.
    pub notify_remote_update_applied: bool,
    /// Deliver `delta_received` notifications.
    pub notify_delta_received: bool,
    /// Deliver `record_delta_received` notifications.
    pub notify_record_delta_received: bool,
    /// Deliver `sync_failed` notifications.
    pub notify_sync_failed: bool,
    /// Sync cycles to wait for word on a crashed change before resending it.
    pub crashed_count_wait: u32,
    /// Reset crashed changes once `crashed_count_wait` is exceeded.
    pub resend_crashed_updates: bool,
    /// Whether the scheduler syncs this dataset on its own.
    pub sync_active: bool,
    /// Minutes after which an unanswered in-flight change is resubmitted.
    /// Zero disables resubmission.
    pub resend_inflight_pendings_minutes: u64,
    /// Base URL of the remote authority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_url: Option<String>,
    /// Path appended to `cloud_url`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_path: Option<String>,
    /// Keys this engine does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_frequency: 10,
            auto_sync_local_updates: true,
            notify_client_storage_failed: true,
            notify_connection_to_storage_failed: true,
            notify_sync_started: true,
            notify_sync_complete: true,
            notify_offline_update: true,
            notify_collision_detected: true,
            notify_remote_update_failed: true,
            notify_local_update_applied: true,
            notify_remote_update_applied: true,
            notify_delta_received: true,
            notify_record_delta_received: true,
            notify_sync_failed: true,
            crashed_count_wait: 10,
            resend_crashed_updates: true,
            sync_active: true,
            resend_inflight_pendings_minutes: 1440,
            cloud_url: None,
            cloud_path: None,
            extra: Map::new(),
        }
    }
}

impl Config {
    /// Returns a copy of this configuration with `overrides` merged in.
    ///
    /// The merge is shallow: every top-level key in `overrides` replaces the
    /// existing value. `null` means no overrides.
    pub fn merged(&self, overrides: &Value) -> SyncResult<Config> {
        let overrides = match overrides {
            Value::Null => return Ok(self.clone()),
            Value::Object(map) => map,
            other => {
                return Err(SyncError::InvalidConfig(format!(
                    "expected an object, got {other}"
                )))
            }
        };

        let mut base = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut base {
            for (key, value) in overrides {
                map.insert(key.clone(), value.clone());
            }
        }
        serde_json::from_value(base)
            .map_err(|e| SyncError::InvalidConfig(format!("rejected override: {e}")))
    }

    /// Returns the configuration as a JSON object, as sent to the authority.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Returns the sync period.
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_frequency)
    }

    /// Returns the path appended to `cloud_url`.
    pub fn cloud_path(&self) -> &str {
        self.cloud_path.as_deref().unwrap_or(DEFAULT_CLOUD_PATH)
    }

    /// Returns true if notifications with `code` should be delivered.
    pub fn notifies(&self, code: NotificationCode) -> bool {
        match code {
            NotificationCode::ClientStorageFailed => self.notify_client_storage_failed,
            NotificationCode::ConnectionToStorageFailed => {
                self.notify_connection_to_storage_failed
            }
            NotificationCode::SyncStarted => self.notify_sync_started,
            NotificationCode::SyncComplete => self.notify_sync_complete,
            NotificationCode::OfflineUpdate => self.notify_offline_update,
            NotificationCode::CollisionDetected => self.notify_collision_detected,
            NotificationCode::RemoteUpdateFailed => self.notify_remote_update_failed,
            NotificationCode::LocalUpdateApplied => self.notify_local_update_applied,
            NotificationCode::RemoteUpdateApplied => self.notify_remote_update_applied,
            NotificationCode::DeltaReceived => self.notify_delta_received,
            NotificationCode::RecordDeltaReceived => self.notify_record_delta_received,
            NotificationCode::SyncFailed => self.notify_sync_failed,
        }
    }

    /// Sets the sync frequency in seconds.
    pub fn with_sync_frequency(mut self, seconds: u64) -> Self {
        self.sync_frequency = seconds;
        self
    }

    /// Enables or disables scheduled syncing.
    pub fn with_sync_active(mut self, active: bool) -> Self {
        self.sync_active = active;
        self
    }

    /// Enables or disables marking the dataset for sync on local changes.
    pub fn with_auto_sync_local_updates(mut self, enabled: bool) -> Self {
        self.auto_sync_local_updates = enabled;
        self
    }

    /// Sets how many sync cycles a crashed change waits before it is resent.
    pub fn with_crashed_count_wait(mut self, cycles: u32) -> Self {
        self.crashed_count_wait = cycles;
        self
    }

    /// Enables or disables resending crashed changes.
    pub fn with_resend_crashed_updates(mut self, enabled: bool) -> Self {
        self.resend_crashed_updates = enabled;
        self
    }

    /// Sets the in-flight resend threshold in minutes.
    pub fn with_resend_inflight_minutes(mut self, minutes: u64) -> Self {
        self.resend_inflight_pendings_minutes = minutes;
        self
    }

    /// Sets the remote authority's base URL.
    pub fn with_cloud_url(mut self, url: impl Into<String>) -> Self {
        self.cloud_url = Some(url.into());
        self
    }

    /// Enables or disables delivery of one notification code.
    pub fn with_notification(mut self, code: NotificationCode, enabled: bool) -> Self {
        let flag = match code {
            NotificationCode::ClientStorageFailed => &mut self.notify_client_storage_failed,
            NotificationCode::ConnectionToStorageFailed => {
                &mut self.notify_connection_to_storage_failed
            }
            NotificationCode::SyncStarted => &mut self.notify_sync_started,
            NotificationCode::SyncComplete => &mut self.notify_sync_complete,
            NotificationCode::OfflineUpdate => &mut self.notify_offline_update,
            NotificationCode::CollisionDetected => &mut self.notify_collision_detected,
            NotificationCode::RemoteUpdateFailed => &mut self.notify_remote_update_failed,
            NotificationCode::LocalUpdateApplied => &mut self.notify_local_update_applied,
            NotificationCode::RemoteUpdateApplied => &mut self.notify_remote_update_applied,
            NotificationCode::DeltaReceived => &mut self.notify_delta_received,
            NotificationCode::RecordDeltaReceived => &mut self.notify_record_delta_received,
            NotificationCode::SyncFailed => &mut self.notify_sync_failed,
        };
        *flag = enabled;
        self
    }
}
