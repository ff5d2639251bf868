//! Pending changes and records.

use crate::hash::{generate_hash, HashMethod};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Kind of local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// A new record.
    Create,
    /// A replacement of an existing record's data.
    Update,
    /// Removal of an existing record.
    Delete,
}

impl Action {
    /// Returns the wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A record's data together with its content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The record payload.
    pub data: Value,
    /// Canonical hash of `data`.
    pub hash: String,
}

impl Record {
    /// Creates a record, hashing `data` with `method`.
    pub fn new(data: Value, method: &dyn HashMethod) -> Self {
        let hash = generate_hash(method, &data);
        Self { data, hash }
    }
}

/// A local mutation that the authority has not confirmed yet.
///
/// Pending changes are identified by the canonical hash of their content.
/// For creates that hash doubles as the temporary record uid until the
/// authority assigns a permanent one.
///
/// # Lifecycle flags
///
/// - `in_flight`: submitted in a sync request whose answer has not arrived
/// - `crashed`: the submitting request failed, so the outcome is unknown
/// - `delayed`: held back until the change named by `waiting` resolves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    /// Identity of the change (content hash).
    pub hash: String,
    /// Target record uid. Equals `hash` for creates until remapped.
    pub uid: String,
    /// The mutation kind.
    pub action: Action,
    /// New value (`null` for deletes).
    pub post: Value,
    /// Canonical hash of `post`.
    pub post_hash: String,
    /// Prior value, for updates and deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre: Option<Value>,
    /// Canonical hash of `pre`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_hash: Option<String>,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Submitted and awaiting an answer.
    #[serde(default)]
    pub in_flight: bool,
    /// When the change was last marked in flight (ms since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_flight_date: Option<i64>,
    /// Submission outcome unknown.
    #[serde(default)]
    pub crashed: bool,
    /// Sync cycles that brought no word on this crashed change.
    #[serde(default)]
    pub crashed_count: u32,
    /// Withheld from submission.
    #[serde(default)]
    pub delayed: bool,
    /// Hash of the in-flight change this one is waiting behind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting: Option<String>,
}

impl PendingChange {
    /// Builds a create and derives its hash, which also becomes its uid.
    pub fn create(post: Value, timestamp: i64, method: &dyn HashMethod) -> Self {
        let post_hash = generate_hash(method, &post);
        let identity = json!({
            "action": Action::Create,
            "inFlight": false,
            "post": post,
            "postHash": post_hash,
            "timestamp": timestamp,
        });
        let hash = generate_hash(method, &identity);

        Self {
            uid: hash.clone(),
            hash,
            action: Action::Create,
            post,
            post_hash,
            pre: None,
            pre_hash: None,
            timestamp,
            in_flight: false,
            in_flight_date: None,
            crashed: false,
            crashed_count: 0,
            delayed: false,
            waiting: None,
        }
    }

    /// Builds an update or delete against `uid`, whose current value is `pre`.
    ///
    /// `post` is ignored for deletes.
    pub fn modify(
        action: Action,
        uid: impl Into<String>,
        post: Value,
        pre: Value,
        timestamp: i64,
        method: &dyn HashMethod,
    ) -> Self {
        let uid = uid.into();
        let post = if action == Action::Delete {
            Value::Null
        } else {
            post
        };
        let post_hash = generate_hash(method, &post);
        let pre_hash = generate_hash(method, &pre);
        let identity = json!({
            "action": action,
            "inFlight": false,
            "post": post,
            "postHash": post_hash,
            "pre": pre,
            "preHash": pre_hash,
            "timestamp": timestamp,
            "uid": uid,
        });
        let hash = generate_hash(method, &identity);

        Self {
            hash,
            uid,
            action,
            post,
            post_hash,
            pre: Some(pre),
            pre_hash: Some(pre_hash),
            timestamp,
            in_flight: false,
            in_flight_date: None,
            crashed: false,
            crashed_count: 0,
            delayed: false,
            waiting: None,
        }
    }

    /// Returns true if the change may be put into the next outgoing batch.
    pub fn is_ready(&self) -> bool {
        !self.in_flight && !self.crashed && !self.delayed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Sha256Hash;

    #[test]
    fn create_uses_hash_as_uid() {
        let change = PendingChange::create(json!({"name": "x"}), 1_000, &Sha256Hash);
        assert_eq!(change.uid, change.hash);
        assert_eq!(change.action, Action::Create);
        assert!(change.pre.is_none());
        assert!(change.is_ready());
    }

    #[test]
    fn identical_creates_collide() {
        let a = PendingChange::create(json!({"name": "x"}), 1_000, &Sha256Hash);
        let b = PendingChange::create(json!({"name": "x"}), 1_000, &Sha256Hash);
        let c = PendingChange::create(json!({"name": "x"}), 1_001, &Sha256Hash);
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn delete_drops_post() {
        let change = PendingChange::modify(
            Action::Delete,
            "rec-1",
            json!({"ignored": true}),
            json!({"name": "x"}),
            5,
            &Sha256Hash,
        );
        assert_eq!(change.post, Value::Null);
        assert_eq!(change.pre, Some(json!({"name": "x"})));
        assert_eq!(change.uid, "rec-1");
        assert_ne!(change.hash, change.uid);
    }

    #[test]
    fn wire_field_names() {
        let mut change = PendingChange::modify(
            Action::Update,
            "rec-1",
            json!({"name": "y"}),
            json!({"name": "x"}),
            5,
            &Sha256Hash,
        );
        change.in_flight = true;
        change.in_flight_date = Some(10);

        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value["action"], "update");
        assert_eq!(value["inFlight"], true);
        assert_eq!(value["inFlightDate"], 10);
        assert!(value.get("postHash").is_some());
        assert!(value.get("preHash").is_some());
        assert!(value.get("waiting").is_none());

        let back: PendingChange = serde_json::from_value(value).unwrap();
        assert_eq!(back, change);
    }

    #[test]
    fn flags_default_when_absent() {
        let change: PendingChange = serde_json::from_value(json!({
            "hash": "h",
            "uid": "h",
            "action": "create",
            "post": {"a": 1},
            "postHash": "p",
            "timestamp": 1
        }))
        .unwrap();
        assert!(change.is_ready());
        assert_eq!(change.crashed_count, 0);
    }
}
