//! The per-dataset local cache.

use crate::config::Config;
use crate::error::SyncResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tidesync_protocol::{PendingChange, Record, UpdateRecord};

/// Link from a record to the latest pending change that touched it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// The record's current value came from a pending change.
    pub from_pending: bool,
    /// Hash of that pending change, until the authority answers for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_uid: Option<String>,
}

/// A named, independently synchronized collection of records.
///
/// The whole struct is the durable snapshot. Runtime flags are saved with it
/// but reset when a snapshot is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    /// Records by uid.
    #[serde(rename = "data")]
    pub records: BTreeMap<String, Record>,
    /// Pending changes by hash.
    pub pending: BTreeMap<String, PendingChange>,
    /// Record metadata by uid.
    pub meta: BTreeMap<String, RecordMeta>,
    /// Effective configuration.
    pub config: Config,
    /// Opaque query forwarded to the authority.
    pub query_params: Value,
    /// Opaque metadata forwarded to the authority.
    pub meta_data: Value,
    /// The authority's last reported aggregate hash.
    pub hash: Option<String>,
    /// Updates processed in the last cycle, echoed in the next request.
    pub acknowledgements: Vec<UpdateRecord>,
    /// `manage` has been called on this dataset.
    pub initialised: bool,
    /// A sync loop is in progress.
    pub sync_running: bool,
    /// The next scheduler tick should sync this dataset.
    pub sync_pending: bool,
    /// Sync regardless of `sync_active`.
    pub sync_forced: bool,
    /// Start of the last sync loop (ms since epoch).
    pub sync_loop_start: Option<i64>,
    /// End of the last sync loop (ms since epoch).
    pub sync_loop_end: Option<i64>,
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Dataset {
    /// Creates an empty, unmanaged dataset.
    pub fn new(config: Config) -> Self {
        Self {
            records: BTreeMap::new(),
            pending: BTreeMap::new(),
            meta: BTreeMap::new(),
            config,
            query_params: json!({}),
            meta_data: json!({}),
            hash: None,
            acknowledgements: Vec::new(),
            initialised: false,
            sync_running: false,
            sync_pending: false,
            sync_forced: false,
            sync_loop_start: None,
            sync_loop_end: None,
        }
    }

    /// Decodes a snapshot. Loaded datasets are neither managed nor running.
    pub fn from_snapshot(bytes: &[u8]) -> SyncResult<Self> {
        let mut dataset: Dataset = serde_json::from_slice(bytes)?;
        dataset.initialised = false;
        dataset.sync_running = false;
        Ok(dataset)
    }

    /// Encodes the dataset as a snapshot.
    pub fn to_snapshot(&self) -> SyncResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Returns the uid to record hash index sent to the authority.
    pub fn record_hashes(&self) -> BTreeMap<String, String> {
        self.records
            .iter()
            .map(|(uid, record)| (uid.clone(), record.hash.clone()))
            .collect()
    }

    /// Returns true if some pending change targets `uid`.
    pub fn has_pending_for(&self, uid: &str) -> bool {
        self.pending.values().any(|change| change.uid == uid)
    }

    /// Returns the number of pending changes currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.pending.values().filter(|change| change.in_flight).count()
    }
}
