//! Protocol messages exchanged with the remote authority.

use crate::change::{Action, PendingChange, Record};
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Name of the field carrying the client identity in every request body.
pub const CLIENT_ID_FIELD: &str = "__fh";

/// A request body sent to the remote authority, tagged by its `fn` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "fn")]
pub enum SyncMessage {
    /// Submit pending changes and compare dataset hashes.
    #[serde(rename = "sync")]
    Sync(SyncRequest),
    /// Record-level diff against the client's record hashes.
    #[serde(rename = "syncRecords")]
    SyncRecords(RecordsRequest),
    /// List collisions recorded by the authority.
    #[serde(rename = "listCollisions")]
    ListCollisions(ListCollisionsRequest),
    /// Discard a recorded collision.
    #[serde(rename = "removeCollision")]
    RemoveCollision(RemoveCollisionRequest),
}

impl SyncMessage {
    /// Returns the value of the `fn` field.
    pub fn function(&self) -> &'static str {
        match self {
            SyncMessage::Sync(_) => "sync",
            SyncMessage::SyncRecords(_) => "syncRecords",
            SyncMessage::ListCollisions(_) => "listCollisions",
            SyncMessage::RemoveCollision(_) => "removeCollision",
        }
    }

    /// Encodes the message as a JSON body with the client identity attached.
    pub fn to_payload(&self, client_id: &str) -> ProtocolResult<Value> {
        let mut value = serde_json::to_value(self)?;
        let body = value
            .as_object_mut()
            .ok_or_else(|| ProtocolError::invalid("request body is not an object"))?;
        body.insert(CLIENT_ID_FIELD.to_string(), json!({ "cuid": client_id }));
        Ok(value)
    }
}

/// The `sync` request: pending changes plus the client's dataset hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Dataset being synchronized.
    pub dataset_id: String,
    /// Opaque query forwarded to the authority.
    pub query_params: Value,
    /// Effective dataset configuration.
    pub config: Value,
    /// Opaque metadata forwarded to the authority.
    pub meta_data: Value,
    /// The authority's last known aggregate hash, if any.
    pub dataset_hash: Option<String>,
    /// Updates processed in the previous cycle.
    pub acknowledgements: Vec<UpdateRecord>,
    /// Changes submitted in this cycle.
    pub pending: Vec<PendingChange>,
}

/// Outcome of one pending change, as reported by the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    /// Record uid. For applied creates this is the permanent uid.
    #[serde(default)]
    pub uid: String,
    /// Hash of the pending change this update answers.
    #[serde(default)]
    pub hash: String,
    /// Action of the pending change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Any further fields the authority includes (`type`, `msg`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UpdateRecord {
    /// Creates an update record with no extra fields.
    pub fn new(uid: impl Into<String>, hash: impl Into<String>, action: Option<Action>) -> Self {
        Self {
            uid: uid.into(),
            hash: hash.into(),
            action,
            extra: Map::new(),
        }
    }
}

/// Per-outcome update maps in a `sync` response, keyed by pending hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Updates {
    /// Changes the authority applied.
    #[serde(default)]
    pub applied: BTreeMap<String, UpdateRecord>,
    /// Changes the authority rejected for a reason other than a collision.
    #[serde(default)]
    pub failed: BTreeMap<String, UpdateRecord>,
    /// Changes rejected because their `pre` no longer matched.
    #[serde(default)]
    pub collisions: BTreeMap<String, UpdateRecord>,
    /// Index of every change the authority has an answer for.
    #[serde(default)]
    pub hashes: BTreeMap<String, UpdateRecord>,
}

impl Updates {
    /// Returns true if the authority has an answer for the pending `hash`.
    pub fn is_resolved(&self, hash: &str) -> bool {
        self.hashes.contains_key(hash)
    }
}

/// The authority's answer to a `sync` request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// The authority's current dataset hash.
    #[serde(default)]
    pub hash: Option<String>,
    /// Outcomes of submitted changes.
    #[serde(default)]
    pub updates: Option<Updates>,
}

impl SyncResponse {
    /// Returns true if the response carries an answer for the pending `hash`.
    pub fn resolves(&self, hash: &str) -> bool {
        self.updates
            .as_ref()
            .is_some_and(|updates| updates.is_resolved(hash))
    }
}

/// The `syncRecords` request: the client's uid to hash index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordsRequest {
    /// Dataset being synchronized.
    pub dataset_id: String,
    /// Opaque query forwarded to the authority.
    pub query_params: Value,
    /// Hash of every record the client holds.
    #[serde(rename = "clientRecs")]
    pub client_recs: BTreeMap<String, String>,
}

/// The authority's record-level delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordsResponse {
    /// The authority's current dataset hash.
    #[serde(default)]
    pub hash: Option<String>,
    /// Records the client does not have.
    #[serde(default)]
    pub create: BTreeMap<String, Record>,
    /// Records whose hash differs from the client's.
    #[serde(default)]
    pub update: BTreeMap<String, Record>,
    /// Records the client should drop.
    #[serde(default)]
    pub delete: BTreeMap<String, Value>,
}

impl RecordsResponse {
    /// Removes every entry for `uid`.
    pub fn strip(&mut self, uid: &str) {
        self.create.remove(uid);
        self.update.remove(uid);
        self.delete.remove(uid);
    }

    /// Returns true if the delta carries no record changes.
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// The `listCollisions` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListCollisionsRequest {
    /// Opaque metadata forwarded to the authority.
    pub meta_data: Value,
}

/// The `removeCollision` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveCollisionRequest {
    /// Hash of the collision to discard.
    pub hash: String,
    /// Opaque metadata forwarded to the authority.
    pub meta_data: Value,
}
