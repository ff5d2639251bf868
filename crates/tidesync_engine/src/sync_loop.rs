//! The per-dataset sync loop.
//!
//! One loop submits the dataset's ready changes together with its last known
//! hash, folds the authority's answer into the pending store, and either
//! completes or hands over to record sync when the hashes disagree:
//!
//! ```text
//! Idle -> Requesting -> Complete
//!                    -> RecordSyncing -> Complete
//!                    -> Failed -> Idle
//! ```
//!
//! Every state change happens under the engine lock in one of the
//! [`EngineState`] steps below. The lock is never held while waiting on the
//! network.

use crate::client::SyncClient;
use crate::clock::now_millis;
use crate::error::{SyncError, SyncResult};
use crate::notify::NotificationCode;
use crate::state::EngineState;
use crate::transport::{CloudHandler, CloudRequest};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tidesync_protocol::{RecordsRequest, SyncMessage, SyncRequest, SyncResponse};
use tracing::{debug, info, warn};

/// Status message of a loop that reached the authority.
pub(crate) const STATUS_ONLINE: &str = "online";
/// Failure reason of a loop that found the device offline.
pub(crate) const STATUS_OFFLINE: &str = "offline";

impl EngineState {
    /// Starts a claimed loop and builds its `sync` request.
    ///
    /// Returns `None` if the dataset is gone or the device is offline; in
    /// the latter case the loop is already completed as failed.
    pub fn begin_sync(&mut self, dataset_id: &str, now: i64, online: bool) -> Option<SyncMessage> {
        let dataset = self.registry.get_mut(dataset_id).ok()?;
        dataset.sync_running = true;
        dataset.sync_loop_start = Some(now);
        self.notify(dataset_id, None, NotificationCode::SyncStarted, Value::Null);

        if !online {
            info!(dataset_id, "offline, skipping sync");
            self.complete(dataset_id, now, NotificationCode::SyncFailed, STATUS_OFFLINE);
            return None;
        }

        let dataset = self.registry.get_mut(dataset_id).ok()?;
        let pending = dataset.select_batch(now);
        debug!(dataset_id, pending = pending.len(), "sending sync request");
        Some(SyncMessage::Sync(SyncRequest {
            dataset_id: dataset_id.to_string(),
            query_params: dataset.query_params.clone(),
            config: dataset.config.to_value(),
            meta_data: dataset.meta_data.clone(),
            dataset_hash: dataset.hash.clone(),
            acknowledgements: dataset.acknowledgements.clone(),
            pending,
        }))
    }

    /// Folds a `sync` answer into the dataset.
    ///
    /// Returns the `syncRecords` request if the authority's hash differs from
    /// ours; otherwise the loop is completed.
    pub fn handle_sync_response(
        &mut self,
        dataset_id: &str,
        response: &SyncResponse,
        now: i64,
    ) -> Option<SyncMessage> {
        let EngineState {
            registry, uid_map, ..
        } = self;
        let Ok(dataset) = registry.get_mut(dataset_id) else {
            warn!(dataset_id, "dataset dropped while syncing");
            return None;
        };

        dataset.reconcile_crashed(response);
        dataset.reconcile_delayed(response);
        dataset.reconcile_meta(response);
        let processed = dataset.apply_updates(response, uid_map);

        let diverged = response
            .hash
            .as_ref()
            .is_some_and(|hash| dataset.hash.as_ref() != Some(hash));
        let follow_up = diverged.then(|| {
            SyncMessage::SyncRecords(RecordsRequest {
                dataset_id: dataset_id.to_string(),
                query_params: dataset.query_params.clone(),
                client_recs: dataset.record_hashes(),
            })
        });

        for update in processed {
            let message = serde_json::to_value(&update.record).unwrap_or(Value::Null);
            self.notify(dataset_id, Some(update.record.uid), update.code, message);
        }

        if follow_up.is_none() {
            self.complete(dataset_id, now, NotificationCode::SyncComplete, STATUS_ONLINE);
        } else {
            debug!(dataset_id, "dataset hash differs, requesting record diff");
        }
        follow_up
    }

    /// Ends a loop whose `sync` request got no usable answer. Every change
    /// that was in flight is marked crashed.
    pub fn fail_sync(&mut self, dataset_id: &str, err: &SyncError, now: i64) {
        warn!(dataset_id, error = %err, "sync request failed");
        if let Ok(dataset) = self.registry.get_mut(dataset_id) {
            dataset.mark_crashed();
        }
        self.complete(dataset_id, now, NotificationCode::SyncFailed, &err.reason());
    }

    /// Ends a loop: clears the running flag, saves, and reports `code`.
    pub fn complete(&mut self, dataset_id: &str, now: i64, code: NotificationCode, status: &str) {
        let Ok(dataset) = self.registry.get_mut(dataset_id) else {
            return;
        };
        dataset.sync_running = false;
        dataset.sync_loop_end = Some(now);
        let hash = dataset.hash.clone();

        if let Err(err) = self.persist(dataset_id) {
            debug!(dataset_id, error = %err, "sync state not saved");
        }
        self.notify(dataset_id, hash, code, status);
        debug!(dataset_id, %code, status, "sync loop finished");
    }
}

/// Decodes an authority answer. An empty answer decodes as the default.
pub(crate) fn decode<R: DeserializeOwned + Default>(value: Value) -> SyncResult<R> {
    if value.is_null() {
        return Ok(R::default());
    }
    serde_json::from_value(value)
        .map_err(|e| SyncError::Protocol(format!("Failed to decode response: {e}")))
}

impl<T: CloudHandler> SyncClient<T> {
    /// Sends `message` with the client identity attached.
    pub(crate) async fn call(&self, dataset_id: &str, message: &SyncMessage) -> SyncResult<Value> {
        let payload = message.to_payload(&self.inner.client_id)?;
        self.inner
            .transport
            .send(CloudRequest {
                dataset_id: dataset_id.to_string(),
                payload,
            })
            .await
    }

    /// Runs one loop for a dataset already claimed by the scheduler.
    pub(crate) async fn run_sync_loop(&self, dataset_id: String) {
        let online = self.inner.network.is_online();
        let request = self
            .inner
            .state
            .lock()
            .begin_sync(&dataset_id, now_millis(), online);
        let Some(request) = request else {
            return;
        };

        let answer = self
            .call(&dataset_id, &request)
            .await
            .and_then(decode::<SyncResponse>);

        let follow_up = {
            let mut state = self.inner.state.lock();
            match answer {
                Ok(response) => state.handle_sync_response(&dataset_id, &response, now_millis()),
                Err(err) => {
                    state.fail_sync(&dataset_id, &err, now_millis());
                    None
                }
            }
        };

        if let Some(records) = follow_up {
            self.run_record_sync(&dataset_id, records).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dataset::Dataset;
    use crate::notify::{Notification, NotifyCallback};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use tidesync_protocol::{Action, Sha256Hash, UpdateRecord, Updates};
    use tidesync_storage::InMemoryStorage;

    fn state() -> (EngineState, Arc<Mutex<Vec<Notification>>>) {
        let mut state = EngineState::new(Arc::new(InMemoryStorage::new()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: NotifyCallback = Arc::new(move |n: &Notification| sink.lock().push(n.clone()));
        state.notifier.set_global(callback);
        let mut dataset = Dataset::new(Config::default());
        dataset.initialised = true;
        state.registry.insert("ds", dataset);
        (state, seen)
    }

    fn codes(state: &mut EngineState, seen: &Mutex<Vec<Notification>>) -> Vec<NotificationCode> {
        crate::notify::deliver(state.notifier.drain());
        seen.lock().drain(..).map(|n| n.code).collect()
    }

    fn enqueue_create(state: &mut EngineState, data: Value) -> String {
        let dataset = state.registry.get_mut("ds").unwrap();
        let change = dataset
            .stage_change("ds", Action::Create, None, data, 1, &Sha256Hash)
            .unwrap();
        dataset.enqueue(change).hash
    }

    #[test]
    fn request_carries_dataset_state() {
        let (mut state, _) = state();
        let hash = enqueue_create(&mut state, json!({"n": 1}));
        {
            let dataset = state.registry.get_mut("ds").unwrap();
            dataset.hash = Some("A".into());
            dataset.query_params = json!({"owner": "me"});
        }

        let Some(SyncMessage::Sync(request)) = state.begin_sync("ds", 100, true) else {
            panic!("expected a sync request");
        };
        assert_eq!(request.dataset_hash.as_deref(), Some("A"));
        assert_eq!(request.query_params, json!({"owner": "me"}));
        assert_eq!(request.config["sync_frequency"], 10);
        assert_eq!(request.pending.len(), 1);
        assert_eq!(request.pending[0].hash, hash);

        let dataset = state.registry.get("ds").unwrap();
        assert!(dataset.sync_running);
        assert_eq!(dataset.sync_loop_start, Some(100));
        assert!(dataset.pending[&hash].in_flight);
    }

    #[test]
    fn offline_loop_fails_without_request() {
        let (mut state, seen) = state();
        assert!(state.begin_sync("ds", 5, false).is_none());

        let dataset = state.registry.get("ds").unwrap();
        assert!(!dataset.sync_running);
        assert_eq!(dataset.sync_loop_end, Some(5));
        assert_eq!(
            codes(&mut state, &seen),
            vec![NotificationCode::SyncStarted, NotificationCode::SyncFailed]
        );
    }

    #[test]
    fn matching_hash_completes() {
        let (mut state, seen) = state();
        state.registry.get_mut("ds").unwrap().hash = Some("A".into());
        state.begin_sync("ds", 1, true);

        let response = SyncResponse {
            hash: Some("A".into()),
            updates: None,
        };
        assert!(state.handle_sync_response("ds", &response, 2).is_none());
        assert!(!state.registry.get("ds").unwrap().sync_running);

        crate::notify::deliver(state.notifier.drain());
        let seen = seen.lock();
        let last = seen.last().unwrap();
        assert_eq!(last.code, NotificationCode::SyncComplete);
        assert_eq!(last.uid.as_deref(), Some("A"));
        assert_eq!(last.message, json!("online"));
    }

    #[test]
    fn diverged_hash_requests_records() {
        let (mut state, _) = state();
        state.registry.get_mut("ds").unwrap().hash = Some("A".into());
        state.begin_sync("ds", 1, true);

        let response = SyncResponse {
            hash: Some("B".into()),
            updates: None,
        };
        let Some(SyncMessage::SyncRecords(request)) = state.handle_sync_response("ds", &response, 2)
        else {
            panic!("expected a records request");
        };
        assert_eq!(request.dataset_id, "ds");
        assert!(state.registry.get("ds").unwrap().sync_running);
    }

    #[test]
    fn failure_crashes_in_flight_changes() {
        let (mut state, seen) = state();
        let hash = enqueue_create(&mut state, json!({"n": 1}));
        state.begin_sync("ds", 1, true);

        state.fail_sync("ds", &SyncError::transport_retryable("timeout"), 2);
        let dataset = state.registry.get("ds").unwrap();
        assert!(dataset.pending[&hash].crashed);
        assert!(!dataset.sync_running);

        crate::notify::deliver(state.notifier.drain());
        let last = seen.lock().last().cloned().unwrap();
        assert_eq!(last.code, NotificationCode::SyncFailed);
        assert_eq!(last.message, json!("timeout"));
    }

    #[test]
    fn applied_updates_are_notified() {
        let (mut state, seen) = state();
        let hash = enqueue_create(&mut state, json!({"n": 1}));
        state.begin_sync("ds", 1, true);

        let mut updates = Updates::default();
        let record = UpdateRecord::new("real-1", hash.clone(), Some(Action::Create));
        updates.applied.insert(hash.clone(), record.clone());
        updates.hashes.insert(hash.clone(), record);
        let response = SyncResponse {
            hash: None,
            updates: Some(updates),
        };
        state.handle_sync_response("ds", &response, 2);

        assert_eq!(
            codes(&mut state, &seen),
            vec![
                NotificationCode::SyncStarted,
                NotificationCode::RemoteUpdateApplied,
                NotificationCode::SyncComplete
            ]
        );
        let dataset = state.registry.get("ds").unwrap();
        assert!(dataset.pending.is_empty());
        assert!(dataset.meta.is_empty());
        assert_eq!(dataset.acknowledgements.len(), 1);
        assert_eq!(state.uid_map.resolve(&hash), "real-1");
    }

    #[test]
    fn complete_finishes_when_storage_is_closed() {
        let storage = Arc::new(InMemoryStorage::new());
        let mut state = EngineState::new(storage.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: NotifyCallback = Arc::new(move |n: &Notification| sink.lock().push(n.clone()));
        state.notifier.set_global(callback);
        let mut dataset = Dataset::new(Config::default());
        dataset.sync_running = true;
        state.registry.insert("ds", dataset);
        storage.set_closed(true);

        state.complete("ds", 7, NotificationCode::SyncComplete, "ok");

        let dataset = state.registry.get("ds").unwrap();
        assert!(!dataset.sync_running);
        assert_eq!(dataset.sync_loop_end, Some(7));
        assert_eq!(
            codes(&mut state, &seen),
            vec![NotificationCode::ConnectionToStorageFailed, NotificationCode::SyncComplete]
        );
    }

    #[test]
    fn empty_answer_decodes_as_default() {
        let response: SyncResponse = decode(Value::Null).unwrap();
        assert_eq!(response, SyncResponse::default());
        assert!(matches!(
            decode::<SyncResponse>(json!({"hash": 5})),
            Err(SyncError::Protocol(_))
        ));
    }
}
