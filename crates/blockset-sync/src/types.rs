use std::collections::BTreeMap;

use blockset_types::{ContentHash, HeadPointer, RecordId};
use serde::{Deserialize, Serialize};

/// A record head as advertised by the remote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHead {
    pub record_id: RecordId,
    pub kind: String,
    pub head: HeadPointer,
}

/// A head update to apply on the remote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadUpdate {
    pub record_id: RecordId,
    pub kind: String,
    /// Head the remote must still hold; `None` if the record must be new.
    pub old: Option<HeadPointer>,
    pub new: HeadPointer,
}

/// A head update the remote refused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadRejection {
    pub record_id: RecordId,
    pub reason: String,
}

/// What pulling one remote head did to the local record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PullOutcome {
    /// The record did not exist locally and was adopted.
    Created,
    UpToDate,
    /// The local head was an ancestor of the remote head.
    FastForward,
    /// The remote head was an ancestor of the local head.
    LocalAhead,
    /// The heads diverged and were joined by a merge commit.
    Merged { commit: ContentHash },
    /// The record was deleted locally; the remote head was ignored.
    Tombstoned,
}

/// Per-record result of one sync.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSync {
    pub record_id: RecordId,
    pub kind: String,
    pub pull: Option<PullOutcome>,
    /// The remote head was moved to the local head.
    pub pushed: bool,
}

/// Summary of one sync.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Per-record results, keyed by record id.
    pub records: BTreeMap<RecordId, RecordSync>,
    pub objects_fetched: usize,
    pub objects_pushed: usize,
    pub rejections: Vec<HeadRejection>,
}

impl SyncReport {
    pub fn record(&self, record_id: &RecordId) -> Option<&RecordSync> {
        self.records.get(record_id)
    }

    /// Pull outcome of `record_id`, if it was pulled.
    pub fn outcome(&self, record_id: &RecordId) -> Option<PullOutcome> {
        self.record(record_id).and_then(|r| r.pull)
    }

    pub fn merged(&self) -> usize {
        self.records
            .values()
            .filter(|r| matches!(r.pull, Some(PullOutcome::Merged { .. })))
            .count()
    }

    pub fn pushed(&self) -> usize {
        self.records.values().filter(|r| r.pushed).count()
    }

    /// Entry for `record_id`, created on first use.
    pub fn entry(&mut self, record_id: RecordId, kind: &str) -> &mut RecordSync {
        self.records.entry(record_id).or_insert_with(|| RecordSync {
            record_id,
            kind: kind.to_string(),
            pull: None,
            pushed: false,
        })
    }
}
