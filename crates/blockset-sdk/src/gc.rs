//! Mark-and-sweep collection of unreferenced objects.
//!
//! The live set is everything reachable from a manifest head: the commits
//! of each record's history, their payloads, and every hash embedded in
//! those payloads (attachment references). Objects outside the live set are
//! deleted once they are older than the grace window, which protects
//! attachments stored by a caller that has not yet saved the record
//! referring to them.

use std::collections::HashSet;
use std::time::{Duration, SystemTime};

use blockset_crypto::embedded_hashes_in;
use blockset_dag::{CommitLog, ReachableSet};
use blockset_manifest::ManifestStore;
use blockset_store::ObjectStore;
use blockset_types::{ContentHash, RecordId};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::AttachmentCache;
use crate::error::SdkResult;

/// Result of a collection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    /// Records whose heads were marked.
    pub live_records: usize,
    /// Objects in the live set.
    pub marked: usize,
    /// Objects deleted.
    pub swept: usize,
    pub bytes_freed: u64,
    /// Unreferenced objects kept because they are younger than the grace
    /// window.
    pub retained_young: usize,
    pub cache_files_removed: usize,
    /// Leftovers of interrupted writes removed.
    pub partials_removed: usize,
}

/// Result of a consistency check.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FsckReport {
    pub objects_checked: usize,
    /// Objects that failed verification during this check and were
    /// quarantined.
    pub corrupt: Vec<ContentHash>,
    /// Everything in quarantine after the check.
    pub quarantined: Vec<ContentHash>,
    /// Records whose history references objects missing locally.
    pub dangling: Vec<DanglingHead>,
}

impl FsckReport {
    pub fn is_clean(&self) -> bool {
        self.corrupt.is_empty() && self.dangling.is_empty()
    }
}

/// A record whose history is incomplete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DanglingHead {
    pub record_id: RecordId,
    pub kind: String,
    pub missing: Vec<ContentHash>,
}

/// `set` plus every hash embedded in its payloads.
pub(crate) async fn with_attachments(
    store: &dyn ObjectStore,
    set: &ReachableSet,
) -> SdkResult<HashSet<ContentHash>> {
    let mut out: HashSet<ContentHash> = set.objects().copied().collect();
    for payload in &set.payloads {
        if let Some(bytes) = store.retrieve(payload).await? {
            out.extend(embedded_hashes_in(&bytes));
        }
    }
    Ok(out)
}

/// Live set of the store. Returns the set and the number of live records.
pub(crate) async fn mark(
    store: &dyn ObjectStore,
    log: &CommitLog,
    manifest: &dyn ManifestStore,
) -> SdkResult<(HashSet<ContentHash>, usize)> {
    let entries = manifest.list_all().await?;
    let mut live = HashSet::new();
    for entry in &entries {
        let reachable = log.reachable(&entry.head.commit_id).await?;
        if !reachable.missing.is_empty() {
            warn!(record = %entry.record_id, missing = reachable.missing.len(), "history incomplete");
        }
        live.extend(with_attachments(store, &reachable).await?);
        live.extend(entry.head.payload_id);
    }
    Ok((live, entries.len()))
}

/// Delete objects outside `live` that are at least `grace` old.
///
/// With `candidates`, only those objects are considered; otherwise every
/// object in the pool is.
pub(crate) async fn sweep(
    store: &dyn ObjectStore,
    cache: Option<&AttachmentCache>,
    live: &HashSet<ContentHash>,
    candidates: Option<&HashSet<ContentHash>>,
    grace: Duration,
) -> SdkResult<GcReport> {
    let now = SystemTime::now();
    let mut report = GcReport {
        marked: live.len(),
        ..GcReport::default()
    };

    let metas = match candidates {
        Some(ids) => {
            let mut metas = Vec::with_capacity(ids.len());
            for id in ids.iter().filter(|id| !live.contains(*id)) {
                metas.extend(store.meta(id).await?);
            }
            metas
        }
        None => store.list().await?,
    };

    for meta in metas {
        if live.contains(&meta.id) {
            continue;
        }
        let age = now.duration_since(meta.modified).unwrap_or_default();
        if age < grace {
            report.retained_young += 1;
            continue;
        }
        if store.delete(&meta.id).await? {
            report.swept += 1;
            report.bytes_freed += meta.size;
            debug!(id = %meta.id, size = meta.size, "swept object");
        }
        if let Some(cache) = cache {
            report.cache_files_removed += cache.evict(&meta.id).await?;
        }
    }
    Ok(report)
}
