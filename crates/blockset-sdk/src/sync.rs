//! Sync of a local store against a remote replica.
//!
//! Pull runs first, record by record: the objects behind the remote head
//! are fetched and verified, then the local head is reconciled under the
//! record's cell lock by fast-forward or merge. Push then sends every local
//! head the remote lacks, guarded by compare-and-swap on the remote.
//!
//! Dropping the sync future at any point leaves every local head either
//! untouched or fully advanced: fetched objects are written parents first,
//! and a head moves only after everything it reaches is stored.

use std::collections::{HashMap, HashSet};

use blockset_cell::{CellState, MutationCell};
use blockset_crypto::{to_canonical_vec, ContentHasher};
use blockset_manifest::{validate_kind, ManifestEntry};
use blockset_merge::MergeInput;
use blockset_sync::{
    object_refs, FetchFrontier, HeadUpdate, NegotiationEngine, PullOutcome, RemoteHead,
    SyncError, SyncReport, SyncTransport,
};
use blockset_types::{ContentHash, HeadPointer, RecordId};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{SdkError, SdkResult};
use crate::gc;
use crate::manager::ObjectStoreManager;

/// Objects requested or pushed per transport call.
const BATCH: usize = 64;

impl ObjectStoreManager {
    /// Pull every remote head, then push every local head the remote lacks.
    pub async fn sync(&self, transport: &dyn SyncTransport) -> SdkResult<SyncReport> {
        let remote_heads = transport.list_heads().await?;
        let mut report = SyncReport::default();

        for remote in &remote_heads {
            if let Err(e) = validate_kind(&remote.kind) {
                warn!(record = %remote.record_id, error = %e, "ignoring remote head");
                continue;
            }
            if self.manifest.is_tombstoned(&remote.record_id).await? {
                report.entry(remote.record_id, &remote.kind).pull = Some(PullOutcome::Tombstoned);
                continue;
            }
            let local = self.manifest.read(&remote.kind, &remote.record_id).await?;
            let outcome = if local.is_some_and(|e| e.head == remote.head) {
                PullOutcome::UpToDate
            } else {
                let fetched = self.fetch_missing(transport, &remote.head).await?;
                report.objects_fetched += fetched.len();
                self.integrate(remote, fetched).await?
            };
            debug!(record = %remote.record_id, ?outcome, "pulled");
            report.entry(remote.record_id, &remote.kind).pull = Some(outcome);
        }

        self.push(transport, &remote_heads, &mut report).await?;

        info!(
            records = report.records.len(),
            merged = report.merged(),
            pushed = report.pushed(),
            fetched = report.objects_fetched,
            rejected = report.rejections.len(),
            "sync finished"
        );
        Ok(report)
    }

    /// Download every object reachable from `head` that is missing locally.
    ///
    /// Returned in discovery order, so children precede their parents.
    /// Nothing is written yet.
    async fn fetch_missing(
        &self,
        transport: &dyn SyncTransport,
        head: &HeadPointer,
    ) -> SdkResult<Vec<(ContentHash, Vec<u8>)>> {
        let mut frontier = FetchFrontier::new(std::iter::once(head.commit_id).chain(head.payload_id));
        let mut fetched = Vec::new();

        loop {
            let batch = frontier.next_batch(BATCH);
            if !batch.is_empty() {
                let mut wants = Vec::with_capacity(batch.len());
                for id in batch {
                    if !self.store.exists(&id).await? {
                        wants.push(id);
                    }
                }
                if wants.is_empty() {
                    continue;
                }
                let objects = transport.fetch_objects(&wants).await?;
                if objects.len() != wants.len() {
                    return Err(SyncError::ShortResponse {
                        requested: wants.len(),
                        actual: objects.len(),
                    }
                    .into());
                }
                for (id, bytes) in wants.into_iter().zip(objects) {
                    verify_received(&id, &bytes)?;
                    frontier.discover(object_refs(id, &bytes));
                    fetched.push((id, bytes));
                }
                continue;
            }

            // Embedded references may name objects the remote never had.
            let Some(id) = frontier.next_optional() else {
                break;
            };
            if self.store.exists(&id).await? {
                continue;
            }
            match transport.fetch_objects(&[id]).await {
                Ok(mut objects) if objects.len() == 1 => {
                    let bytes = objects.remove(0);
                    verify_received(&id, &bytes)?;
                    frontier.discover(object_refs(id, &bytes));
                    fetched.push((id, bytes));
                }
                Ok(_) | Err(SyncError::MissingObject(_)) => {
                    debug!(%id, "embedded reference not available on remote");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(fetched)
    }

    /// Store fetched objects and reconcile the local head with `remote`.
    async fn integrate(
        &self,
        remote: &RemoteHead,
        fetched: Vec<(ContentHash, Vec<u8>)>,
    ) -> SdkResult<PullOutcome> {
        let _gate = self.gc_gate.read().await;
        for (id, bytes) in fetched.iter().rev() {
            let stored = self.store.store(bytes).await?;
            debug_assert_eq!(stored, *id);
        }

        let record_id = remote.record_id;
        let cell = self.cells.get_or_insert_with(record_id, MutationCell::new);
        let mut guard = cell.lock().await;
        let local = match self.catch_up(&mut guard, &remote.kind, record_id).await? {
            // Deleted while this sync was fetching.
            CellState::Retired => return Ok(PullOutcome::Tombstoned),
            state => state.head(),
        };
        let (head, outcome) = match local {
            None => (remote.head, PullOutcome::Created),
            Some(local) => {
                if local.commit_id == remote.head.commit_id {
                    return Ok(PullOutcome::UpToDate);
                }
                if self.log.is_ancestor(&local.commit_id, &remote.head.commit_id).await? {
                    (remote.head, PullOutcome::FastForward)
                } else if self.log.is_ancestor(&remote.head.commit_id, &local.commit_id).await? {
                    return Ok(PullOutcome::LocalAhead);
                } else {
                    let head = self.merge_heads(&local, &remote.head).await?;
                    (head, PullOutcome::Merged { commit: head.commit_id })
                }
            }
        };

        self.manifest
            .write(&ManifestEntry::new(record_id, remote.kind.clone(), head))
            .await?;
        guard.advance(head)?;
        Ok(outcome)
    }

    /// Create the merge commit of two divergent heads.
    async fn merge_heads(&self, local: &HeadPointer, remote: &HeadPointer) -> SdkResult<HeadPointer> {
        let base = self.log.merge_base(&local.commit_id, &remote.commit_id).await?;
        let base_value = match &base {
            Some(base) => {
                let commit = self.log.read(&base.id).await?;
                Some(self.payload_value(commit.payload.as_ref()).await?)
            }
            None => None,
        };
        let local_value = self.payload_value(local.payload_id.as_ref()).await?;
        let remote_value = self.payload_value(remote.payload_id.as_ref()).await?;

        let (local_ahead, remote_ahead) = match &base {
            Some(base) => (base.distance_a, base.distance_b),
            None => (
                self.log.ancestors(&local.commit_id).await?.len(),
                self.log.ancestors(&remote.commit_id).await?.len(),
            ),
        };
        let merged = self.merge_policy.merge(&MergeInput {
            base: base_value.as_ref(),
            local: &local_value,
            remote: &remote_value,
            local_ahead,
            remote_ahead,
            local_head: local.commit_id,
            remote_head: remote.commit_id,
        })?;

        let bytes = to_canonical_vec(&merged)?;
        let payload = self.store.store(&bytes).await?;
        let commit = self
            .log
            .append(vec![local.commit_id, remote.commit_id], Some(payload))
            .await?;
        debug!(merge = %commit.id.short_hex(), base = ?base.map(|b| b.id), "created merge commit");
        Ok(HeadPointer::new(commit.id, Some(payload)))
    }

    async fn payload_value(&self, payload: Option<&ContentHash>) -> SdkResult<Value> {
        let Some(id) = payload else {
            return Ok(Value::Null);
        };
        let bytes = self
            .store
            .retrieve(id)
            .await?
            .ok_or_else(|| SdkError::NotFound(format!("payload {id}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Send local heads the remote lacks, then swap the remote heads.
    async fn push(
        &self,
        transport: &dyn SyncTransport,
        remote_heads: &[RemoteHead],
        report: &mut SyncReport,
    ) -> SdkResult<()> {
        let remote_by_id: HashMap<RecordId, HeadPointer> =
            remote_heads.iter().map(|r| (r.record_id, r.head)).collect();

        let mut updates = Vec::new();
        let mut to_send: HashSet<ContentHash> = HashSet::new();
        for entry in self.manifest.list_all().await? {
            let remote = remote_by_id.get(&entry.record_id).copied();
            if remote == Some(entry.head) {
                continue;
            }
            let remote_reach = match remote {
                Some(remote) => {
                    if self.log.is_ancestor(&entry.head.commit_id, &remote.commit_id).await? {
                        continue;
                    }
                    let reach = self.log.reachable(&remote.commit_id).await?;
                    gc::with_attachments(self.store.as_ref(), &reach).await?
                }
                None => HashSet::new(),
            };
            let local_reach = self.log.reachable(&entry.head.commit_id).await?;
            let local_reach = gc::with_attachments(self.store.as_ref(), &local_reach).await?;
            to_send.extend(NegotiationEngine::objects_to_push(&local_reach, &remote_reach));
            updates.push(HeadUpdate {
                record_id: entry.record_id,
                kind: entry.kind,
                old: remote,
                new: entry.head,
            });
        }
        if updates.is_empty() {
            return Ok(());
        }

        let mut ids: Vec<ContentHash> = to_send.into_iter().collect();
        ids.sort();
        for chunk in ids.chunks(BATCH) {
            // Embedded references that name no local object are skipped.
            let objects: Vec<Vec<u8>> = self
                .store
                .retrieve_batch(chunk)
                .await?
                .into_iter()
                .flatten()
                .collect();
            report.objects_pushed += objects.len();
            transport.push_objects(&objects).await?;
        }

        let rejections = transport.update_heads(&updates).await?;
        let rejected: HashSet<RecordId> = rejections.iter().map(|r| r.record_id).collect();
        for rejection in &rejections {
            warn!(record = %rejection.record_id, reason = %rejection.reason, "remote rejected head update");
        }
        for update in &updates {
            if !rejected.contains(&update.record_id) {
                report.entry(update.record_id, &update.kind).pushed = true;
            }
        }
        report.rejections.extend(rejections);
        Ok(())
    }
}

fn verify_received(id: &ContentHash, bytes: &[u8]) -> SdkResult<()> {
    let actual = ContentHasher::OBJECT.hash(bytes);
    if actual != *id {
        return Err(SyncError::VerificationFailed {
            expected: *id,
            actual,
        }
        .into());
    }
    Ok(())
}
