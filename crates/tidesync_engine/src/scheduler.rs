//! Periodic scheduling of sync loops.
//!
//! A single timer ticks every [`TICK_INTERVAL`]. Each tick first delivers
//! queued notifications, then claims every dataset that is due and spawns
//! one sync loop task per claimed dataset. Claiming sets `sync_running`, so
//! a dataset never has two loops at once while different datasets sync
//! concurrently.

use crate::client::SyncClient;
use crate::clock::now_millis;
use crate::dataset::Dataset;
use crate::notify::deliver;
use crate::state::EngineState;
use crate::transport::CloudHandler;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Period of the scheduler timer.
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

impl Dataset {
    /// Claims the dataset for a sync loop if it is due at `now`.
    ///
    /// A managed dataset that is not already syncing is due when it was
    /// forced, marked pending, never synced, or last synced longer ago than
    /// its sync frequency; unless forced it must also have `sync_active`.
    pub fn claim_if_due(&mut self, now: i64) -> bool {
        if !self.initialised || self.sync_running {
            return false;
        }
        if !(self.config.sync_active || self.sync_forced) {
            return false;
        }

        let interval = i64::try_from(self.config.sync_frequency)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        let elapsed = match self.sync_loop_end {
            Some(end) => now.saturating_sub(end) > interval,
            None => true,
        };
        let due = self.sync_forced
            || self.sync_pending
            || self.sync_loop_start.is_none()
            || elapsed;
        if due {
            self.sync_forced = false;
            self.sync_pending = false;
            self.sync_running = true;
        }
        due
    }
}

impl EngineState {
    /// Claims every due dataset and returns their ids.
    pub fn claim_due(&mut self, now: i64) -> Vec<String> {
        let mut due: Vec<String> = self
            .registry
            .iter_mut()
            .filter_map(|(id, dataset)| dataset.claim_if_due(now).then(|| id.clone()))
            .collect();
        due.sort();
        due
    }
}

impl<T: CloudHandler> SyncClient<T> {
    /// Runs one scheduler tick and returns the spawned sync loop tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn tick(&self) -> Vec<JoinHandle<()>> {
        let (queued, due) = {
            let mut state = self.inner.state.lock();
            let queued = state.notifier.drain();
            let due = state.claim_due(now_millis());
            (queued, due)
        };
        deliver(queued);

        due.into_iter()
            .map(|dataset_id| {
                debug!(%dataset_id, "starting sync loop");
                let client = self.clone();
                tokio::spawn(async move { client.run_sync_loop(dataset_id).await })
            })
            .collect()
    }

    /// Delivers queued notifications now. Returns how many were delivered.
    pub fn flush_notifications(&self) -> usize {
        let queued = self.inner.state.lock().notifier.drain();
        let count = queued.len();
        deliver(queued);
        count
    }

    /// Starts the scheduler timer. Returns false if it was already running.
    ///
    /// Must be called from within a Tokio runtime. The timer keeps a handle
    /// to the client until [`SyncClient::shutdown`] is called.
    pub fn start(&self) -> bool {
        let mut monitor = self.inner.monitor.lock();
        if monitor.is_some() {
            return false;
        }

        let client = self.clone();
        *monitor = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                client.tick();
            }
        }));
        info!(client_id = %self.inner.client_id, "sync scheduler started");
        true
    }

    /// Stops the scheduler timer. Loops already running finish on their own.
    pub fn shutdown(&self) {
        if let Some(handle) = self.inner.monitor.lock().take() {
            handle.abort();
            info!(client_id = %self.inner.client_id, "sync scheduler stopped");
        }
    }

    /// Returns true if the scheduler timer is running.
    pub fn is_started(&self) -> bool {
        self.inner.monitor.lock().is_some()
    }
}
