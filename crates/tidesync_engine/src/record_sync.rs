//! Record-level reconciliation.
//!
//! When the authority's dataset hash differs from ours, the client sends the
//! hash of every record it holds and the authority answers with the records
//! to create, update and delete. Records with an unconfirmed local change
//! are left alone: the authority's copy predates that change.

use crate::client::SyncClient;
use crate::clock::now_millis;
use crate::notify::NotificationCode;
use crate::state::EngineState;
use crate::sync_loop::{decode, STATUS_ONLINE};
use crate::transport::CloudHandler;
use tidesync_protocol::{Action, RecordsResponse, SyncMessage};
use tracing::{debug, warn};

/// Message of the `delta_received` notification.
const DELTA_MESSAGE: &str = "partial dataset";

impl EngineState {
    /// Applies a record delta and completes the loop.
    pub fn apply_record_delta(&mut self, dataset_id: &str, mut delta: RecordsResponse, now: i64) {
        let Ok(dataset) = self.registry.get_mut(dataset_id) else {
            warn!(dataset_id, "dataset dropped while syncing records");
            return;
        };

        for change in dataset.pending.values() {
            delta.strip(&change.uid);
        }

        let mut changed = Vec::new();
        for (uid, record) in delta.create {
            dataset.records.insert(uid.clone(), record);
            changed.push((uid, Action::Create));
        }
        for (uid, record) in delta.update {
            dataset.records.insert(uid.clone(), record);
            changed.push((uid, Action::Update));
        }
        for uid in delta.delete.into_keys() {
            dataset.records.remove(&uid);
            changed.push((uid, Action::Delete));
        }
        if let Some(hash) = &delta.hash {
            dataset.hash = Some(hash.clone());
        }
        debug!(dataset_id, records = changed.len(), "record delta applied");

        for (uid, action) in changed {
            self.notify(
                dataset_id,
                Some(uid),
                NotificationCode::RecordDeltaReceived,
                action.as_str(),
            );
        }
        self.notify(
            dataset_id,
            delta.hash,
            NotificationCode::DeltaReceived,
            DELTA_MESSAGE,
        );
        self.complete(dataset_id, now, NotificationCode::SyncComplete, STATUS_ONLINE);
    }
}

impl<T: CloudHandler> SyncClient<T> {
    /// Runs the record diff phase of a loop and completes it.
    pub(crate) async fn run_record_sync(&self, dataset_id: &str, request: SyncMessage) {
        let answer = self
            .call(dataset_id, &request)
            .await
            .and_then(decode::<RecordsResponse>);

        let mut state = self.inner.state.lock();
        match answer {
            Ok(delta) => state.apply_record_delta(dataset_id, delta, now_millis()),
            Err(err) => {
                warn!(dataset_id, error = %err, "record sync failed");
                state.complete(
                    dataset_id,
                    now_millis(),
                    NotificationCode::SyncFailed,
                    &err.reason(),
                );
            }
        }
    }
}
