//! Pending change lifecycle.
//!
//! Local mutations are staged against a dataset's optimistic view and kept
//! until the authority answers for them. A change moves through
//! `ready -> in flight -> acknowledged`, with two detours: `crashed` when the
//! request carrying it failed, and `delayed` when it targets a record whose
//! previous change is still in flight.

use crate::dataset::{Dataset, RecordMeta};
use crate::error::{SyncError, SyncResult};
use crate::notify::NotificationCode;
use crate::uid_map::UidMap;
use serde_json::Value;
use std::collections::BTreeMap;
use tidesync_protocol::{Action, HashMethod, PendingChange, Record, SyncResponse, UpdateRecord};
use tracing::{debug, trace};

const MILLIS_PER_MINUTE: i64 = 60_000;

/// An authority answer that removed a pending change.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedUpdate {
    /// Notification to emit for it.
    pub code: NotificationCode,
    /// The authority's record of the outcome.
    pub record: UpdateRecord,
}

impl Dataset {
    /// Builds a pending change for a local mutation.
    ///
    /// `uid` must already be resolved through the uid map. Updates and
    /// deletes snapshot the record's current value as `pre`.
    pub fn stage_change(
        &self,
        dataset_id: &str,
        action: Action,
        uid: Option<&str>,
        data: Value,
        now: i64,
        method: &dyn HashMethod,
    ) -> SyncResult<PendingChange> {
        if action == Action::Create {
            if data.is_null() {
                return Err(SyncError::NullData);
            }
            return Ok(PendingChange::create(data, now, method));
        }

        let unknown = |uid: &str| SyncError::UnknownUid {
            dataset_id: dataset_id.to_string(),
            uid: uid.to_string(),
        };
        let uid = uid.ok_or_else(|| unknown(""))?;
        let record = self.records.get(uid).ok_or_else(|| unknown(uid))?;
        Ok(PendingChange::modify(
            action,
            uid,
            data,
            record.data.clone(),
            now,
            method,
        ))
    }

    /// Overlays `change` onto the optimistic view and queues it.
    ///
    /// Returns the change that now represents the mutation: the merged
    /// earlier change when an update folds into one, otherwise `change`
    /// itself with any delay applied. A delete that cancels an unsent create
    /// is returned but not queued.
    pub fn enqueue(&mut self, mut change: PendingChange) -> PendingChange {
        let uid = change.uid.clone();
        let previous = self
            .meta
            .get(&uid)
            .filter(|meta| meta.from_pending && self.records.contains_key(&uid))
            .and_then(|meta| meta.pending_uid.clone())
            .and_then(|hash| self.pending.get(&hash).cloned());

        let mut queue = true;
        match (change.action, previous) {
            (Action::Create, Some(previous)) => {
                self.pending.remove(&previous.hash);
            }
            (Action::Update, Some(previous)) if !previous.in_flight => {
                // Fold into the unsent change.
                if let Some(existing) = self.pending.get_mut(&previous.hash) {
                    existing.post = change.post.clone();
                    existing.post_hash = change.post_hash.clone();
                    change = existing.clone();
                }
                queue = false;
            }
            (Action::Delete, Some(previous)) if !previous.in_flight => {
                self.pending.remove(&previous.hash);
                match previous.action {
                    Action::Create => queue = false,
                    Action::Update => {
                        change.pre = previous.pre;
                        change.pre_hash = previous.pre_hash;
                        change.delayed = previous.delayed;
                        change.waiting = previous.waiting;
                    }
                    Action::Delete => {}
                }
            }
            (Action::Update | Action::Delete, Some(previous)) => {
                change.delayed = true;
                change.waiting = Some(previous.hash);
            }
            (_, None) => {}
        }

        if queue {
            self.pending.insert(change.hash.clone(), change.clone());
        }

        match change.action {
            Action::Create | Action::Update => {
                self.records.insert(
                    uid.clone(),
                    Record {
                        data: change.post.clone(),
                        hash: change.post_hash.clone(),
                    },
                );
                self.meta.insert(
                    uid,
                    RecordMeta {
                        from_pending: true,
                        pending_uid: Some(change.hash.clone()),
                    },
                );
            }
            Action::Delete => {
                self.records.remove(&uid);
                if queue {
                    self.meta.insert(
                        uid,
                        RecordMeta {
                            from_pending: true,
                            pending_uid: Some(change.hash.clone()),
                        },
                    );
                } else {
                    self.meta.remove(&uid);
                }
            }
        }

        trace!(hash = %change.hash, action = %change.action, queued = queue, "pending change staged");
        change
    }

    /// Picks the changes to submit in the next sync request.
    ///
    /// Ready changes are marked in flight. In-flight changes older than the
    /// resend threshold are submitted again and their in-flight date is
    /// refreshed, so a lost answer costs one resend per threshold window.
    pub fn select_batch(&mut self, now: i64) -> Vec<PendingChange> {
        let resend_after = i64::try_from(self.config.resend_inflight_pendings_minutes)
            .unwrap_or(i64::MAX)
            .saturating_mul(MILLIS_PER_MINUTE);
        let resend_enabled = self.config.resend_inflight_pendings_minutes > 0;

        let mut batch = Vec::new();
        for change in self.pending.values_mut() {
            if change.is_ready() {
                change.in_flight = true;
                change.in_flight_date = Some(now);
                batch.push(change.clone());
            } else if resend_enabled && change.in_flight && !change.crashed {
                let stale = change
                    .in_flight_date
                    .is_some_and(|date| now.saturating_sub(date) >= resend_after);
                if stale {
                    debug!(hash = %change.hash, "resending unanswered in-flight change");
                    change.in_flight_date = Some(now);
                    batch.push(change.clone());
                }
            }
        }
        batch
    }

    /// Marks every in-flight change as crashed. Returns how many were marked.
    pub fn mark_crashed(&mut self) -> usize {
        let mut marked = 0;
        for change in self.pending.values_mut().filter(|c| c.in_flight) {
            change.crashed = true;
            marked += 1;
        }
        marked
    }

    /// Counts cycles without word on crashed changes and releases the ones
    /// past the threshold for resubmission. Returns how many were released.
    pub fn reconcile_crashed(&mut self, response: &SyncResponse) -> usize {
        let threshold = self.config.crashed_count_wait;
        let resend = self.config.resend_crashed_updates;

        let mut released = 0;
        for change in self.pending.values_mut() {
            if !(change.crashed && change.in_flight) {
                continue;
            }
            if !response.resolves(&change.hash) {
                change.crashed_count = change.crashed_count.saturating_add(1);
            }
            if resend && change.crashed_count > threshold {
                debug!(hash = %change.hash, count = change.crashed_count, "releasing crashed change");
                change.crashed = false;
                change.in_flight = false;
                change.crashed_count = 0;
                released += 1;
            }
        }
        released
    }

    /// Releases delayed changes whose blocking change has been answered or
    /// is no longer pending. Returns how many were released.
    pub fn reconcile_delayed(&mut self, response: &SyncResponse) -> usize {
        let live: Vec<String> = self.pending.keys().cloned().collect();
        let mut released = 0;
        for change in self.pending.values_mut().filter(|c| c.delayed) {
            let unblocked = match &change.waiting {
                Some(waiting) => response.resolves(waiting) || !live.contains(waiting),
                None => true,
            };
            if unblocked {
                change.delayed = false;
                change.waiting = None;
                released += 1;
            }
        }
        released
    }

    /// Drops record metadata whose pending change has been answered, along
    /// with metadata that no longer points anywhere.
    pub fn reconcile_meta(&mut self, response: &SyncResponse) {
        if response.updates.is_none() {
            return;
        }
        self.meta.retain(|_, meta| match &meta.pending_uid {
            Some(hash) => !response.resolves(hash),
            None => false,
        });
    }

    /// Applies the authority's per-change outcomes.
    ///
    /// Applied creates are remapped to their permanent uid first. Every
    /// answered change still in flight is dropped from `pending`, and every
    /// outcome becomes an acknowledgement for the next request.
    pub fn apply_updates(
        &mut self,
        response: &SyncResponse,
        uid_map: &mut UidMap,
    ) -> Vec<ProcessedUpdate> {
        let Some(updates) = &response.updates else {
            return Vec::new();
        };

        for record in updates.applied.values() {
            if record.action == Some(Action::Create) && !record.uid.is_empty() {
                uid_map.remap(self, &record.hash, &record.uid);
            }
        }

        let mut acknowledgements = Vec::new();
        let mut processed = Vec::new();
        let outcomes: [(&BTreeMap<String, UpdateRecord>, NotificationCode); 3] = [
            (&updates.applied, NotificationCode::RemoteUpdateApplied),
            (&updates.failed, NotificationCode::RemoteUpdateFailed),
            (&updates.collisions, NotificationCode::CollisionDetected),
        ];
        for (records, code) in outcomes {
            for (hash, record) in records {
                acknowledgements.push(record.clone());
                let in_flight = self.pending.get(hash).is_some_and(|c| c.in_flight);
                if in_flight {
                    self.pending.remove(hash);
                    processed.push(ProcessedUpdate {
                        code,
                        record: record.clone(),
                    });
                }
            }
        }

        self.acknowledgements = acknowledgements;
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use proptest::prelude::*;
    use serde_json::json;
    use tidesync_protocol::{Sha256Hash, Updates};

    const DS: &str = "ds1";

    fn create(dataset: &mut Dataset, data: Value, now: i64) -> PendingChange {
        let change = dataset
            .stage_change(DS, Action::Create, None, data, now, &Sha256Hash)
            .unwrap();
        dataset.enqueue(change)
    }

    fn modify(dataset: &mut Dataset, action: Action, uid: &str, data: Value, now: i64) -> PendingChange {
        let change = dataset
            .stage_change(DS, action, Some(uid), data, now, &Sha256Hash)
            .unwrap();
        dataset.enqueue(change)
    }

    fn answered(hashes: &[&str]) -> SyncResponse {
        let mut updates = Updates::default();
        for hash in hashes {
            updates
                .hashes
                .insert(hash.to_string(), UpdateRecord::new("", *hash, None));
        }
        SyncResponse {
            hash: None,
            updates: Some(updates),
        }
    }

    #[test]
    fn create_is_visible_immediately() {
        let mut dataset = Dataset::default();
        let change = create(&mut dataset, json!({"name": "x"}), 1);

        assert_eq!(dataset.records[&change.uid].data, json!({"name": "x"}));
        assert_eq!(dataset.pending.len(), 1);
        assert_eq!(
            dataset.meta[&change.uid].pending_uid.as_deref(),
            Some(change.hash.as_str())
        );
    }

    #[test]
    fn create_without_data_is_rejected() {
        let dataset = Dataset::default();
        let result = dataset.stage_change(DS, Action::Create, None, Value::Null, 1, &Sha256Hash);
        assert!(matches!(result, Err(SyncError::NullData)));
    }

    #[test]
    fn modify_unknown_uid_is_rejected() {
        let dataset = Dataset::default();
        let result = dataset.stage_change(DS, Action::Update, Some("nope"), json!({}), 1, &Sha256Hash);
        assert!(matches!(result, Err(SyncError::UnknownUid { uid, .. }) if uid == "nope"));
        let result = dataset.stage_change(DS, Action::Delete, None, Value::Null, 1, &Sha256Hash);
        assert!(matches!(result, Err(SyncError::UnknownUid { .. })));
    }

    #[test]
    fn identical_create_replaces_itself() {
        let mut dataset = Dataset::default();
        let first = create(&mut dataset, json!({"name": "x"}), 1);
        let second = create(&mut dataset, json!({"name": "x"}), 1);

        assert_eq!(first.hash, second.hash);
        assert_eq!(dataset.pending.len(), 1);
        assert!(dataset.records.contains_key(&first.uid));
    }

    #[test]
    fn update_merges_into_unsent_change() {
        let mut dataset = Dataset::default();
        let created = create(&mut dataset, json!({"n": 1}), 1);
        let merged = modify(&mut dataset, Action::Update, &created.uid, json!({"n": 2}), 2);

        assert_eq!(dataset.pending.len(), 1);
        assert_eq!(merged.hash, created.hash);
        assert_eq!(merged.action, Action::Create);
        assert_eq!(dataset.pending[&created.hash].post, json!({"n": 2}));
        assert_eq!(dataset.records[&created.uid].data, json!({"n": 2}));
    }

    #[test]
    fn update_merges_into_unsent_update() {
        let mut dataset = Dataset::default();
        dataset
            .records
            .insert("r1".into(), Record::new(json!({"n": 0}), &Sha256Hash));

        let first = modify(&mut dataset, Action::Update, "r1", json!({"n": 1}), 1);
        let second = modify(&mut dataset, Action::Update, "r1", json!({"n": 2}), 2);

        assert_eq!(dataset.pending.len(), 1);
        assert_eq!(second.hash, first.hash);
        let only = &dataset.pending[&first.hash];
        assert_eq!(only.post, json!({"n": 2}));
        assert_eq!(only.pre, Some(json!({"n": 0})));
    }

    #[test]
    fn update_behind_in_flight_change_is_delayed() {
        let mut dataset = Dataset::default();
        let created = create(&mut dataset, json!({"n": 1}), 1);
        dataset.select_batch(10);

        let update = modify(&mut dataset, Action::Update, &created.uid, json!({"n": 2}), 11);
        assert!(update.delayed);
        assert_eq!(update.waiting.as_deref(), Some(created.hash.as_str()));
        assert_eq!(dataset.pending.len(), 2);
        assert_eq!(dataset.records[&created.uid].data, json!({"n": 2}));

        // Delayed changes stay out of the batch
        let batch = dataset.select_batch(12);
        assert!(batch.is_empty());
    }

    #[test]
    fn third_change_folds_into_the_delayed_one() {
        let mut dataset = Dataset::default();
        let created = create(&mut dataset, json!({"n": 1}), 1);
        dataset.select_batch(10);

        let delayed = modify(&mut dataset, Action::Update, &created.uid, json!({"n": 2}), 11);
        let third = modify(&mut dataset, Action::Update, &created.uid, json!({"n": 3}), 12);

        assert_eq!(third.hash, delayed.hash);
        assert_eq!(dataset.pending.len(), 2);
        let waiting = &dataset.pending[&delayed.hash];
        assert!(waiting.delayed);
        assert_eq!(waiting.post, json!({"n": 3}));

        // The blocking create is answered, so the folded change goes next
        dataset.reconcile_delayed(&answered(&[created.hash.as_str()]));
        dataset.pending.remove(&created.hash);
        let batch = dataset.select_batch(20);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].post, json!({"n": 3}));
    }

    #[test]
    fn delete_cancels_unsent_create() {
        let mut dataset = Dataset::default();
        let created = create(&mut dataset, json!({"n": 1}), 1);
        modify(&mut dataset, Action::Delete, &created.uid, Value::Null, 2);

        assert!(dataset.pending.is_empty());
        assert!(dataset.records.is_empty());
        assert!(dataset.meta.is_empty());
    }

    #[test]
    fn delete_replaces_unsent_update() {
        let mut dataset = Dataset::default();
        dataset
            .records
            .insert("r1".into(), Record::new(json!({"n": 0}), &Sha256Hash));

        let update = modify(&mut dataset, Action::Update, "r1", json!({"n": 1}), 1);
        let delete = modify(&mut dataset, Action::Delete, "r1", Value::Null, 2);

        assert_eq!(dataset.pending.len(), 1);
        assert!(!dataset.pending.contains_key(&update.hash));
        let only = &dataset.pending[&delete.hash];
        assert_eq!(only.action, Action::Delete);
        assert_eq!(only.pre, Some(json!({"n": 0})));
        assert_eq!(only.pre_hash, update.pre_hash);
        assert!(!dataset.records.contains_key("r1"));
    }

    #[test]
    fn delete_behind_in_flight_change_is_delayed() {
        let mut dataset = Dataset::default();
        dataset
            .records
            .insert("r1".into(), Record::new(json!({"n": 0}), &Sha256Hash));
        let update = modify(&mut dataset, Action::Update, "r1", json!({"n": 1}), 1);
        dataset.select_batch(5);

        let delete = modify(&mut dataset, Action::Delete, "r1", Value::Null, 6);
        assert!(delete.delayed);
        assert_eq!(delete.waiting.as_deref(), Some(update.hash.as_str()));
        assert_eq!(dataset.pending.len(), 2);
        assert!(!dataset.records.contains_key("r1"));
    }

    #[test]
    fn select_batch_marks_in_flight() {
        let mut dataset = Dataset::default();
        create(&mut dataset, json!({"a": 1}), 1);
        create(&mut dataset, json!({"b": 1}), 1);

        let batch = dataset.select_batch(100);
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|c| c.in_flight && c.in_flight_date == Some(100)));
        assert_eq!(dataset.in_flight_count(), 2);

        // Nothing new to send
        assert!(dataset.select_batch(101).is_empty());
    }

    #[test]
    fn stale_in_flight_changes_are_resent() {
        let mut dataset = Dataset::new(Config::default().with_resend_inflight_minutes(1));
        let created = create(&mut dataset, json!({"a": 1}), 1);
        dataset.select_batch(0);

        assert!(dataset.select_batch(59_999).is_empty());
        let resent = dataset.select_batch(60_000);
        assert_eq!(resent.len(), 1);
        assert_eq!(resent[0].hash, created.hash);
        assert_eq!(dataset.pending[&created.hash].in_flight_date, Some(60_000));

        // Crashed changes are never resent this way
        dataset.mark_crashed();
        assert!(dataset.select_batch(600_000).is_empty());
    }

    #[test]
    fn zero_minutes_disables_resend() {
        let mut dataset = Dataset::new(Config::default().with_resend_inflight_minutes(0));
        create(&mut dataset, json!({"a": 1}), 1);
        dataset.select_batch(0);
        assert!(dataset.select_batch(i64::MAX / 2).is_empty());
    }

    #[test]
    fn failed_submission_crashes_in_flight_only() {
        let mut dataset = Dataset::default();
        let sent = create(&mut dataset, json!({"a": 1}), 1);
        dataset.select_batch(2);
        let unsent = create(&mut dataset, json!({"b": 1}), 3);

        assert_eq!(dataset.mark_crashed(), 1);
        assert!(dataset.pending[&sent.hash].crashed);
        assert!(!dataset.pending[&unsent.hash].crashed);
        assert_eq!(dataset.pending.len(), 2);
    }

    #[test]
    fn crashed_change_is_released_after_threshold() {
        let mut dataset = Dataset::new(Config::default().with_crashed_count_wait(2));
        let change = create(&mut dataset, json!({"a": 1}), 1);
        dataset.select_batch(2);
        dataset.mark_crashed();

        let silent = answered(&[]);
        assert_eq!(dataset.reconcile_crashed(&silent), 0);
        assert_eq!(dataset.reconcile_crashed(&silent), 0);
        assert_eq!(dataset.pending[&change.hash].crashed_count, 2);
        assert_eq!(dataset.reconcile_crashed(&silent), 1);

        let released = &dataset.pending[&change.hash];
        assert!(!released.crashed);
        assert!(!released.in_flight);
        assert!(released.is_ready());
    }

    #[test]
    fn answered_crashed_change_is_not_counted() {
        let mut dataset = Dataset::new(Config::default().with_crashed_count_wait(0));
        let change = create(&mut dataset, json!({"a": 1}), 1);
        dataset.select_batch(2);
        dataset.mark_crashed();

        assert_eq!(dataset.reconcile_crashed(&answered(&[change.hash.as_str()])), 0);
        assert!(dataset.pending[&change.hash].crashed);
        assert_eq!(dataset.pending[&change.hash].crashed_count, 0);
    }

    #[test]
    fn crashed_changes_stay_put_when_resend_is_off() {
        let mut dataset = Dataset::new(
            Config::default()
                .with_crashed_count_wait(0)
                .with_resend_crashed_updates(false),
        );
        let change = create(&mut dataset, json!({"a": 1}), 1);
        dataset.select_batch(2);
        dataset.mark_crashed();

        for _ in 0..5 {
            assert_eq!(dataset.reconcile_crashed(&answered(&[])), 0);
        }
        assert!(dataset.pending[&change.hash].crashed);
    }

    #[test]
    fn delayed_change_waits_for_its_blocker() {
        let mut dataset = Dataset::default();
        let created = create(&mut dataset, json!({"n": 1}), 1);
        dataset.select_batch(2);
        let update = modify(&mut dataset, Action::Update, &created.uid, json!({"n": 2}), 3);

        assert_eq!(dataset.reconcile_delayed(&answered(&["other"])), 0);
        assert!(dataset.pending[&update.hash].delayed);

        assert_eq!(dataset.reconcile_delayed(&answered(&[created.hash.as_str()])), 1);
        let released = &dataset.pending[&update.hash];
        assert!(!released.delayed);
        assert!(released.waiting.is_none());
    }

    #[test]
    fn delayed_change_is_released_when_blocker_vanishes() {
        let mut dataset = Dataset::default();
        let created = create(&mut dataset, json!({"n": 1}), 1);
        dataset.select_batch(2);
        let update = modify(&mut dataset, Action::Update, &created.uid, json!({"n": 2}), 3);
        dataset.pending.remove(&created.hash);

        assert_eq!(dataset.reconcile_delayed(&SyncResponse::default()), 1);
        assert!(!dataset.pending[&update.hash].delayed);
    }

    #[test]
    fn meta_is_collected_once_answered() {
        let mut dataset = Dataset::default();
        let a = create(&mut dataset, json!({"a": 1}), 1);
        let b = create(&mut dataset, json!({"b": 1}), 1);
        dataset.meta.insert("orphan".into(), RecordMeta::default());

        // No updates at all: nothing is touched
        dataset.reconcile_meta(&SyncResponse::default());
        assert_eq!(dataset.meta.len(), 3);

        dataset.reconcile_meta(&answered(&[a.hash.as_str()]));
        assert!(!dataset.meta.contains_key(&a.uid));
        assert!(dataset.meta.contains_key(&b.uid));
        assert!(!dataset.meta.contains_key("orphan"));
    }

    #[test]
    fn apply_updates_remaps_and_acknowledges() {
        let mut dataset = Dataset::default();
        let created = create(&mut dataset, json!({"n": 1}), 1);
        let failed = create(&mut dataset, json!({"n": 2}), 1);
        dataset.select_batch(2);

        let mut updates = Updates::default();
        updates.applied.insert(
            created.hash.clone(),
            UpdateRecord::new("real-1", created.hash.clone(), Some(Action::Create)),
        );
        updates.failed.insert(
            failed.hash.clone(),
            UpdateRecord::new(failed.uid.clone(), failed.hash.clone(), Some(Action::Create)),
        );
        updates.collisions.insert(
            "unknown".into(),
            UpdateRecord::new("x", "unknown", Some(Action::Update)),
        );
        let response = SyncResponse {
            hash: Some("H2".into()),
            updates: Some(updates),
        };

        let mut uid_map = UidMap::new();
        let processed = dataset.apply_updates(&response, &mut uid_map);

        let codes: Vec<_> = processed.iter().map(|p| p.code).collect();
        assert_eq!(
            codes,
            vec![
                NotificationCode::RemoteUpdateApplied,
                NotificationCode::RemoteUpdateFailed
            ]
        );
        assert!(dataset.pending.is_empty());
        assert_eq!(dataset.acknowledgements.len(), 3);
        assert_eq!(uid_map.resolve(&created.hash), "real-1");
        assert_eq!(dataset.records["real-1"].data, json!({"n": 1}));
    }

    #[test]
    fn replayed_response_is_ignored() {
        let mut dataset = Dataset::default();
        let created = create(&mut dataset, json!({"n": 1}), 1);
        dataset.select_batch(2);

        let mut updates = Updates::default();
        let record = UpdateRecord::new("real-1", created.hash.clone(), Some(Action::Create));
        updates.applied.insert(created.hash.clone(), record.clone());
        updates.hashes.insert(created.hash.clone(), record);
        let response = SyncResponse {
            hash: None,
            updates: Some(updates),
        };

        let mut uid_map = UidMap::new();
        assert_eq!(dataset.apply_updates(&response, &mut uid_map).len(), 1);
        let after_first = dataset.clone();
        assert!(dataset.apply_updates(&response, &mut uid_map).is_empty());
        assert_eq!(dataset.records, after_first.records);
        assert_eq!(dataset.pending, after_first.pending);
    }

    #[test]
    fn answers_for_unsent_changes_are_ignored() {
        let mut dataset = Dataset::default();
        let created = create(&mut dataset, json!({"n": 1}), 1);

        let mut updates = Updates::default();
        updates.failed.insert(
            created.hash.clone(),
            UpdateRecord::new(created.uid.clone(), created.hash.clone(), None),
        );
        let response = SyncResponse {
            hash: None,
            updates: Some(updates),
        };

        assert!(dataset.apply_updates(&response, &mut UidMap::new()).is_empty());
        assert!(dataset.pending.contains_key(&created.hash));
        assert_eq!(dataset.acknowledgements.len(), 1);
    }

    proptest! {
        #[test]
        fn batch_selection_ignores_insertion_order(
            values in prop::collection::vec(0i64..1000, 1..12),
            rotate in 0usize..12,
        ) {
            let changes: Vec<PendingChange> = values
                .iter()
                .enumerate()
                .map(|(i, v)| PendingChange::create(json!({"v": v, "i": i}), 1, &Sha256Hash))
                .collect();

            let mut forward = Dataset::default();
            for change in &changes {
                forward.enqueue(change.clone());
            }
            let mut rotated = Dataset::default();
            let mut reordered = changes.clone();
            reordered.rotate_left(rotate % changes.len());
            reordered.reverse();
            for change in reordered {
                rotated.enqueue(change);
            }

            let mut a: Vec<String> = forward.select_batch(5).into_iter().map(|c| c.hash).collect();
            let mut b: Vec<String> = rotated.select_batch(5).into_iter().map(|c| c.hash).collect();
            a.sort();
            b.sort();
            prop_assert_eq!(a, b);
        }
    }
}
