//! Canonical hashing of JSON values.
//!
//! Two values that are equal as JSON documents must hash identically no
//! matter how their object keys were ordered when they were built. The
//! canonical form replaces every object with a list of `{"key", "value"}`
//! pairs sorted by key; arrays keep their order and primitives pass through.
//! The canonical form is then serialized and handed to a [`HashMethod`].

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// A deterministic digest of a canonical string.
///
/// The protocol only needs equality-comparable output with collision
/// resistance commensurate with dataset size. Any closure
/// `Fn(&str) -> String` is a hash method.
pub trait HashMethod: Send + Sync {
    /// Digests `input` into a printable string.
    fn digest(&self, input: &str) -> String;
}

impl<F> HashMethod for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn digest(&self, input: &str) -> String {
        self(input)
    }
}

/// SHA-256, hex encoded. The default hash method.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hash;

impl HashMethod for Sha256Hash {
    fn digest(&self, input: &str) -> String {
        hex::encode(Sha256::digest(input.as_bytes()))
    }
}

/// Rewrites `value` into its order-stable canonical structure.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Value::Array(
                keys.into_iter()
                    .map(|key| {
                        let mut pair = Map::with_capacity(2);
                        pair.insert("key".to_string(), Value::String(key.clone()));
                        pair.insert("value".to_string(), canonicalize(&map[key]));
                        Value::Object(pair)
                    })
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serializes the canonical structure of `value`.
pub fn canonical_string(value: &Value) -> String {
    // Serializing a `Value` cannot fail: every map key is already a string.
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

/// Hashes `value` with `method`: `digest(canonical_string(value))`.
pub fn generate_hash(method: &dyn HashMethod, value: &Value) -> String {
    method.digest(&canonical_string(value))
}
