//! Canonical JSON encoding.
//!
//! Every structured object BlockSet hashes (record payloads, commits) goes
//! through this encoding first, so that logically-equal values always produce
//! identical bytes:
//!
//! - object keys are emitted in byte-wise sorted order, at every depth
//! - no insignificant whitespace
//! - numbers and strings use `serde_json`'s fixed formatting

use serde::Serialize;
use serde_json::{Map, Value};

use crate::hasher::HasherError;

/// Serialize `value` into a key-sorted [`Value`] tree.
pub fn to_canonical_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, HasherError> {
    let value = serde_json::to_value(value).map_err(|e| HasherError::Encoding(e.to_string()))?;
    Ok(sort_keys(value))
}

/// Serialize `value` into canonical JSON bytes.
pub fn to_canonical_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HasherError> {
    let value = to_canonical_value(value)?;
    serde_json::to_vec(&value).map_err(|e| HasherError::Encoding(e.to_string()))
}

// Rebuilds maps in sorted order. Without serde_json's `preserve_order`
// feature `Map` is already a BTreeMap; with it, insertion order is kept, so
// inserting sorted keeps the output canonical either way.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, inner) in entries {
                sorted.insert(key, sort_keys(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
