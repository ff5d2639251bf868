//! Temporary to permanent uid mapping.
//!
//! A record created offline is keyed by its pending change hash. Once the
//! authority applies the create and assigns a permanent uid, the cache is
//! rewritten under the new uid and the mapping lets callers holding the old
//! uid keep addressing the record.

use crate::dataset::Dataset;
use std::collections::HashMap;
use tracing::debug;

/// Mapping from temporary uids to the permanent uids that replaced them.
#[derive(Debug, Clone, Default)]
pub struct UidMap {
    map: HashMap<String, String>,
}

impl UidMap {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current uid for `uid`: the mapped permanent uid if one
    /// exists, else `uid` itself.
    pub fn resolve<'a>(&'a self, uid: &'a str) -> &'a str {
        self.map.get(uid).map(String::as_str).unwrap_or(uid)
    }

    /// Returns the number of remapped uids.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if nothing has been remapped.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Records `old -> new` and rewrites `dataset` to use `new`.
    ///
    /// The record and its metadata move to the new key, and every pending
    /// change still targeting `old` is retargeted.
    pub fn remap(&mut self, dataset: &mut Dataset, old: &str, new: &str) {
        if old == new {
            return;
        }
        debug!(old, new, "remapping temporary uid");
        self.map.insert(old.to_string(), new.to_string());

        if let Some(record) = dataset.records.remove(old) {
            dataset.records.insert(new.to_string(), record);
        }
        if let Some(meta) = dataset.meta.remove(old) {
            dataset.meta.insert(new.to_string(), meta);
        }
        for change in dataset.pending.values_mut() {
            if change.uid == old {
                change.uid = new.to_string();
            }
        }
    }
}
