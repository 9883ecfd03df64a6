use std::time::{SystemTime, UNIX_EPOCH};

use blockset_types::{HeadPointer, RecordId};
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Current head of one live record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub record_id: RecordId,
    pub kind: String,
    pub head: HeadPointer,
    pub updated_ms: u64,
}

impl ManifestEntry {
    pub fn new(record_id: RecordId, kind: impl Into<String>, head: HeadPointer) -> Self {
        Self {
            record_id,
            kind: kind.into(),
            head,
            updated_ms: now_ms(),
        }
    }
}

/// Marker left behind by a deleted record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub record_id: RecordId,
    pub kind: String,
    /// Head at the time of deletion; `None` if the record was never saved.
    pub last_head: Option<HeadPointer>,
    pub deleted_ms: u64,
}

impl Tombstone {
    pub fn new(record_id: RecordId, kind: impl Into<String>, last_head: Option<HeadPointer>) -> Self {
        Self {
            record_id,
            kind: kind.into(),
            last_head,
            deleted_ms: now_ms(),
        }
    }
}
