//! Discovery of content hashes embedded in payloads.
//!
//! Records refer to attachments by storing their hash as an ordinary string
//! field. Garbage collection and sync find those references by scanning
//! decoded payloads for strings in canonical hash form. The scan is
//! conservative: an unrelated string that happens to look like a hash keeps
//! an object alive, never the reverse.

use std::collections::BTreeSet;

use blockset_types::ContentHash;
use serde_json::Value;

/// Every string at any depth of `value` that parses as a [`ContentHash`].
pub fn embedded_hashes(value: &Value) -> BTreeSet<ContentHash> {
    let mut out = BTreeSet::new();
    collect(value, &mut out);
    out
}

/// Like [`embedded_hashes`] over raw bytes. Bytes that are not JSON embed
/// nothing.
pub fn embedded_hashes_in(bytes: &[u8]) -> BTreeSet<ContentHash> {
    serde_json::from_slice::<Value>(bytes)
        .map(|v| embedded_hashes(&v))
        .unwrap_or_default()
}

fn collect(value: &Value, out: &mut BTreeSet<ContentHash>) {
    match value {
        Value::String(s) if ContentHash::is_hash_like(s) => {
            if let Ok(id) = s.parse() {
                out.insert(id);
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect(v, out)),
        _ => {}
    }
}
