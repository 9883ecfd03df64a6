use std::path::{Path, PathBuf};
use std::sync::Arc;

use blockset_cell::{CellRegistry, CellState, CellWriteGuard, MutationCell, Record, RecordHandle};
use blockset_crypto::{to_canonical_vec, ContentHasher};
use blockset_dag::{Commit, CommitLog, Walk};
use blockset_manifest::{
    validate_kind, FsManifest, InMemoryManifest, ManifestEntry, ManifestStore, Tombstone,
};
use blockset_merge::{FieldMerge, MergePolicy};
use blockset_store::{FsObjectStore, FsStoreOptions, InMemoryObjectStore, ObjectStore, StoreError};
use blockset_types::{ContentHash, HeadPointer, RecordId};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::AttachmentCache;
use crate::config::StoreConfig;
use crate::error::{SdkError, SdkResult};
use crate::gc::{self, DanglingHead, FsckReport, GcReport};

const CACHE_DIR: &str = "cache";
const TMP_DIR: &str = "tmp";

/// What a save did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    /// First commit of a new record.
    Created,
    /// A new commit on top of the previous head.
    Updated,
    /// The value equals the current head's payload; nothing was written.
    Unchanged,
}

/// Entry point for applications: versioned records, attachments, garbage
/// collection and sync over one store root.
///
/// Saves of different records run fully in parallel. Saves of one record
/// (through any of its handles) are applied one at a time by the record's
/// mutation cell. Garbage collection excludes saves only while it sweeps.
pub struct ObjectStoreManager {
    root: Option<PathBuf>,
    config: StoreConfig,
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) log: CommitLog,
    pub(crate) manifest: Arc<dyn ManifestStore>,
    pub(crate) cells: CellRegistry,
    cache: Option<AttachmentCache>,
    /// Saves hold it shared; sweeps hold it exclusively.
    pub(crate) gc_gate: RwLock<()>,
    pub(crate) merge_policy: Arc<dyn MergePolicy>,
}

impl ObjectStoreManager {
    fn assemble(
        root: Option<PathBuf>,
        config: StoreConfig,
        store: Arc<dyn ObjectStore>,
        manifest: Arc<dyn ManifestStore>,
        cache: Option<AttachmentCache>,
    ) -> Self {
        Self {
            root,
            config,
            log: CommitLog::new(store.clone()),
            store,
            manifest,
            cells: CellRegistry::new(),
            cache,
            gc_gate: RwLock::new(()),
            merge_policy: Arc::new(FieldMerge),
        }
    }

    /// Open the store rooted at `root` with an explicit configuration.
    pub async fn open(root: impl Into<PathBuf>, config: StoreConfig) -> SdkResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        let store = FsObjectStore::open(
            root.clone(),
            FsStoreOptions {
                verify_reads: config.verify_reads,
                fsync: config.fsync,
            },
        )
        .await?;
        let manifest = FsManifest::open(root.clone(), config.fsync).await?;
        let cache = AttachmentCache::open(root.join(CACHE_DIR), root.join(TMP_DIR)).await?;
        info!(root = %root.display(), "opened store");
        Ok(Self::assemble(
            Some(root),
            config,
            Arc::new(store),
            Arc::new(manifest),
            Some(cache),
        ))
    }

    /// Open the store rooted at `root`, reading `blockset.toml` if present.
    pub async fn open_at(root: impl Into<PathBuf>) -> SdkResult<Self> {
        let root = root.into();
        let config = StoreConfig::load(&root).await?;
        Self::open(root, config).await
    }

    /// Create a store at `root` with a default `blockset.toml`, or open the
    /// existing one.
    pub async fn init(root: impl Into<PathBuf>) -> SdkResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        let config_path = root.join(StoreConfig::FILE_NAME);
        if !tokio::fs::try_exists(&config_path).await? {
            tokio::fs::write(&config_path, StoreConfig::default().to_toml_string()?).await?;
        }
        Self::open_at(root).await
    }

    /// A store that lives only in memory.
    pub fn in_memory() -> Self {
        Self::in_memory_with(StoreConfig::default())
    }

    pub fn in_memory_with(config: StoreConfig) -> Self {
        Self::assemble(
            None,
            config,
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryManifest::new()),
            None,
        )
    }

    /// Replace the policy used to merge divergent heads during sync.
    pub fn with_merge_policy(mut self, policy: impl MergePolicy + 'static) -> Self {
        self.merge_policy = Arc::new(policy);
        self
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // ---- Records ----

    /// Persist the handle's current value as a new commit of its record.
    ///
    /// The value is hashed before any lock is taken. If it equals the
    /// payload at the head, nothing is written.
    pub async fn save<T: Record>(&self, handle: &RecordHandle<T>) -> SdkResult<SaveOutcome> {
        validate_kind(T::KIND)?;
        let bytes = to_canonical_vec(handle.value())?;
        let payload_id = ContentHasher::OBJECT.hash(&bytes);
        let record_id = handle.id();

        let _gate = self.gc_gate.read().await;
        let cell = handle.cell();
        let mut guard = cell.lock().await;
        // Readers that find the new manifest entry must join this cell.
        self.cells.register(record_id, cell);
        let current = match self.catch_up(&mut guard, T::KIND, record_id).await? {
            CellState::Retired => return Err(SdkError::Deleted(record_id)),
            state => state.head(),
        };
        if current.is_some_and(|head| head.has_payload(&payload_id)) {
            debug!(record = %record_id, "value unchanged");
            return Ok(SaveOutcome::Unchanged);
        }

        let stored = self.store.store(&bytes).await?;
        let parents = current.map(|h| vec![h.commit_id]).unwrap_or_default();
        let commit = self.log.append(parents, Some(stored)).await?;
        let head = HeadPointer::new(commit.id, Some(stored));
        self.manifest
            .write(&ManifestEntry::new(record_id, T::KIND, head))
            .await?;
        guard.advance(head)?;
        drop(guard);

        debug!(record = %record_id, kind = T::KIND, ?head, "saved");
        Ok(if current.is_some() {
            SaveOutcome::Updated
        } else {
            SaveOutcome::Created
        })
    }

    /// The shared cell of a record and its head, seeding a fresh cell from
    /// the manifest if no handle currently holds one. `None` if the record
    /// has no live manifest entry.
    pub(crate) async fn attach_cell(
        &self,
        kind: &str,
        record_id: RecordId,
    ) -> SdkResult<Option<(Arc<MutationCell>, HeadPointer)>> {
        let cell = self.cells.get_or_insert_with(record_id, MutationCell::new);
        let mut guard = cell.lock().await;
        let head = match self.catch_up(&mut guard, kind, record_id).await? {
            CellState::Pointing(head) => head,
            CellState::Uninitialized | CellState::Retired => return Ok(None),
        };
        drop(guard);
        Ok(Some((cell, head)))
    }

    /// Bring a locked cell in line with the durable manifest, and return
    /// its state.
    ///
    /// The manifest is written before the cell advances, so a writer whose
    /// future is dropped in between leaves the manifest ahead of the cell.
    /// Every writer calls this under the cell lock before reading the head.
    /// A tombstone without an entry retires the cell.
    pub(crate) async fn catch_up(
        &self,
        guard: &mut CellWriteGuard<'_>,
        kind: &str,
        record_id: RecordId,
    ) -> SdkResult<CellState> {
        let state = guard.state();
        if state == CellState::Retired {
            return Ok(state);
        }
        match self.manifest.read(kind, &record_id).await? {
            Some(entry) if state.head() == Some(entry.head) => {}
            Some(entry) => {
                if let Some(stale) = state.head() {
                    warn!(record = %record_id, ?stale, head = ?entry.head, "cell behind manifest, catching up");
                }
                guard.advance(entry.head)?;
            }
            None if self.manifest.is_tombstoned(&record_id).await? => {
                guard.retire();
            }
            None => {}
        }
        Ok(guard.state())
    }

    /// Decode the payload at `head`. `None` if the payload is not present
    /// locally.
    async fn load_value<T: Record>(
        &self,
        record_id: RecordId,
        head: &HeadPointer,
    ) -> SdkResult<Option<T>> {
        let Some(payload) = head.payload_id else {
            return Ok(None);
        };
        let Some(bytes) = self.store.retrieve(&payload).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| SdkError::Encoding(format!("record {record_id} ({}): {e}", T::KIND)))
    }

    /// Every live record of type `T`.
    ///
    /// Records whose payload is not present locally yet are skipped with a
    /// warning. Corrupt or undecodable payloads fail the whole call.
    pub async fn fetch_all<T: Record>(&self) -> SdkResult<Vec<RecordHandle<T>>> {
        let entries = self.manifest.list(T::KIND).await?;
        let mut handles = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some((cell, head)) = self.attach_cell(T::KIND, entry.record_id).await? else {
                continue;
            };
            match self.load_value::<T>(entry.record_id, &head).await? {
                Some(value) => handles.push(RecordHandle::from_parts(entry.record_id, value, cell)),
                None => warn!(record = %entry.record_id, kind = T::KIND, "payload not available locally, skipping"),
            }
        }
        debug!(kind = T::KIND, count = handles.len(), "fetched records");
        Ok(handles)
    }

    /// One record by id. `None` if it does not exist as a `T`, or its
    /// payload is not present locally.
    pub async fn fetch<T: Record>(&self, record_id: RecordId) -> SdkResult<Option<RecordHandle<T>>> {
        if self.manifest.read(T::KIND, &record_id).await?.is_none() {
            return Ok(None);
        }
        let Some((cell, head)) = self.attach_cell(T::KIND, record_id).await? else {
            return Ok(None);
        };
        let value = self.load_value::<T>(record_id, &head).await?;
        Ok(value.map(|value| RecordHandle::from_parts(record_id, value, cell)))
    }

    /// Reload the handle's value from its cell's current head, e.g. after a
    /// sync moved the head.
    pub async fn refresh<T: Record>(&self, handle: &mut RecordHandle<T>) -> SdkResult<()> {
        let record_id = handle.id();
        let head = match handle.cell().state() {
            CellState::Pointing(head) => head,
            CellState::Retired => return Err(SdkError::Deleted(record_id)),
            CellState::Uninitialized => {
                return Err(SdkError::NotFound(format!("record {record_id} was never saved")))
            }
        };
        let value = self
            .load_value::<T>(record_id, &head)
            .await?
            .ok_or_else(|| SdkError::NotFound(format!("payload of record {record_id}")))?;
        handle.set_value(value);
        Ok(())
    }

    /// Delete a record.
    ///
    /// The record is tombstoned and removed from the manifest, then its cell
    /// is retired so every handle sharing it refuses further saves. With
    /// `collect_on_delete`, objects only this record reached are collected
    /// (subject to the grace window). Deleting twice is a no-op.
    pub async fn delete<T: Record>(&self, handle: &RecordHandle<T>) -> SdkResult<()> {
        let record_id = handle.id();
        let last_head = {
            let _gate = self.gc_gate.read().await;
            let mut guard = handle.cell().lock().await;
            let last_head = match self.catch_up(&mut guard, T::KIND, record_id).await? {
                CellState::Retired => return Ok(()),
                state => state.head(),
            };
            self.manifest
                .tombstone(&Tombstone::new(record_id, T::KIND, last_head))
                .await?;
            self.manifest.remove(T::KIND, &record_id).await?;
            guard.retire();
            last_head
        };
        self.cells.remove(&record_id);
        info!(record = %record_id, kind = T::KIND, "deleted record");

        if let (true, Some(head)) = (self.config.collect_on_delete, last_head) {
            let report = self.collect_history(&head).await?;
            debug!(record = %record_id, swept = report.swept, "collected deleted record");
        }
        Ok(())
    }

    /// Sweep the objects reachable from `head` that no live record reaches.
    async fn collect_history(&self, head: &HeadPointer) -> SdkResult<GcReport> {
        let _gate = self.gc_gate.write().await;
        let reachable = self.log.reachable(&head.commit_id).await?;
        let candidates = gc::with_attachments(self.store.as_ref(), &reachable).await?;
        let (live, live_records) = gc::mark(self.store.as_ref(), &self.log, self.manifest.as_ref()).await?;
        let mut report = gc::sweep(
            self.store.as_ref(),
            self.cache.as_ref(),
            &live,
            Some(&candidates),
            self.config.gc_grace(),
        )
        .await?;
        report.live_records = live_records;
        Ok(report)
    }

    // ---- Attachments ----

    /// Store raw bytes (a recording, a photo) and return their hash. Records
    /// refer to attachments by embedding the hash string in their value.
    pub async fn store_attachment(&self, data: &[u8]) -> SdkResult<ContentHash> {
        let _gate = self.gc_gate.read().await;
        Ok(self.store.store(data).await?)
    }

    pub async fn retrieve_attachment(&self, id: &ContentHash) -> SdkResult<Option<Vec<u8>>> {
        Ok(self.store.retrieve(id).await?)
    }

    /// File holding the object `id`.
    pub async fn path_of(&self, id: &ContentHash) -> SdkResult<PathBuf> {
        let path = self
            .store
            .path_of(id)
            .ok_or_else(|| SdkError::Unsupported("in-memory stores keep no object files".into()))?;
        if !self.store.exists(id).await? {
            return Err(SdkError::NotFound(format!("object {id}")));
        }
        Ok(path)
    }

    /// A copy of attachment `id` named `<hash>.<extension>`, for consumers
    /// that infer the format from the file name.
    pub async fn materialize_attachment(&self, id: &ContentHash, extension: &str) -> SdkResult<PathBuf> {
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| SdkError::Unsupported("in-memory stores keep no cache".into()))?;
        let path = cache.path_for(id, extension)?;
        if tokio::fs::try_exists(&path).await? {
            return Ok(path);
        }
        let data = self
            .store
            .retrieve(id)
            .await?
            .ok_or_else(|| SdkError::NotFound(format!("object {id}")))?;
        cache.materialize(id, extension, &data).await
    }

    // ---- History and maintenance ----

    /// First-parent cursor from `head`.
    pub fn walk(&self, head: ContentHash) -> Walk {
        self.log.walk(head)
    }

    pub fn commit_log(&self) -> &CommitLog {
        &self.log
    }

    /// Full history of a live record, head first.
    pub async fn history(&self, record_id: &RecordId) -> SdkResult<Vec<Commit>> {
        let entry = self
            .manifest
            .find(record_id)
            .await?
            .ok_or_else(|| SdkError::NotFound(format!("record {record_id}")))?;
        Ok(self.log.ancestors(&entry.head.commit_id).await?)
    }

    /// Manifest entries, optionally limited to one kind.
    pub async fn records(&self, kind: Option<&str>) -> SdkResult<Vec<ManifestEntry>> {
        Ok(match kind {
            Some(kind) => self.manifest.list(kind).await?,
            None => self.manifest.list_all().await?,
        })
    }

    /// Delete every object no live record reaches and that is older than
    /// the grace window.
    pub async fn garbage_collect(&self) -> SdkResult<GcReport> {
        let _gate = self.gc_gate.write().await;
        let grace = self.config.gc_grace();
        let (live, live_records) = gc::mark(self.store.as_ref(), &self.log, self.manifest.as_ref()).await?;
        let mut report = gc::sweep(self.store.as_ref(), self.cache.as_ref(), &live, None, grace).await?;
        report.live_records = live_records;
        report.partials_removed = self.store.clean_partials(grace).await?;
        self.cells.prune();
        info!(
            live_records,
            marked = report.marked,
            swept = report.swept,
            bytes_freed = report.bytes_freed,
            retained_young = report.retained_young,
            "garbage collection finished"
        );
        Ok(report)
    }

    /// Re-hash every object, quarantining failures, and check that every
    /// record's history is complete.
    pub async fn verify(&self) -> SdkResult<FsckReport> {
        let _gate = self.gc_gate.read().await;
        let mut report = FsckReport::default();

        for meta in self.store.list().await? {
            report.objects_checked += 1;
            match self.store.retrieve(&meta.id).await {
                Ok(Some(bytes)) => {
                    if !ContentHasher::OBJECT.verify(&bytes, &meta.id) {
                        warn!(id = %meta.id, "object failed verification, quarantining");
                        self.store.quarantine(&meta.id).await?;
                        report.corrupt.push(meta.id);
                    }
                }
                Ok(None) => {}
                Err(StoreError::CorruptObject { id, .. }) => report.corrupt.push(id),
                Err(e) => return Err(e.into()),
            }
        }

        for entry in self.manifest.list_all().await? {
            let reachable = self.log.reachable(&entry.head.commit_id).await?;
            let mut missing: Vec<ContentHash> = reachable.missing.iter().copied().collect();
            for payload in &reachable.payloads {
                if !self.store.exists(payload).await? {
                    missing.push(*payload);
                }
            }
            if !missing.is_empty() {
                missing.sort();
                report.dangling.push(DanglingHead {
                    record_id: entry.record_id,
                    kind: entry.kind,
                    missing,
                });
            }
        }

        report.quarantined = self.store.quarantined().await?;
        info!(
            checked = report.objects_checked,
            corrupt = report.corrupt.len(),
            dangling = report.dangling.len(),
            "verification finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde::Deserialize;

    use super::*;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Task {
        title: String,
        #[serde(default)]
        done: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<ContentHash>,
    }

    impl Record for Task {
        const KIND: &'static str = "task";
    }

    fn task(title: &str) -> Task {
        Task {
            title: title.into(),
            done: false,
            audio: None,
        }
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        body: String,
    }

    impl Record for Note {
        const KIND: &'static str = "note";
    }

    fn eager() -> StoreConfig {
        StoreConfig {
            gc_grace_secs: 0,
            ..StoreConfig::default()
        }
    }

    async fn open_fs(dir: &Path, config: StoreConfig) -> ObjectStoreManager {
        ObjectStoreManager::open(dir, config).await.unwrap()
    }

    fn payload_of<T>(handle: &RecordHandle<T>) -> ContentHash {
        handle.current_head().unwrap().payload_id.unwrap()
    }

    #[tokio::test]
    async fn new_task_then_updated() {
        let m = ObjectStoreManager::in_memory();
        let mut handle = RecordHandle::initial(task("New task"));
        assert_eq!(m.save(&handle).await.unwrap(), SaveOutcome::Created);
        let h1 = handle.current_head().unwrap();

        handle.value_mut().title = "Updated".into();
        assert_eq!(m.save(&handle).await.unwrap(), SaveOutcome::Updated);
        let h2 = handle.current_head().unwrap();
        assert_ne!(h1.payload_id, h2.payload_id);
        assert_eq!(m.commit_log().read(&h2.commit_id).await.unwrap().parents, vec![h1.commit_id]);

        let all = m.fetch_all::<Task>().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value().title, "Updated");
        assert_eq!(all[0], handle);

        let walked: Vec<_> = m
            .walk(h2.commit_id)
            .collect()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(walked, vec![h2.commit_id, h1.commit_id]);
    }

    #[tokio::test]
    async fn unchanged_value_writes_nothing() {
        let m = ObjectStoreManager::in_memory();
        let handle = RecordHandle::initial(task("same"));
        m.save(&handle).await.unwrap();
        let head = handle.current_head();
        assert_eq!(m.save(&handle).await.unwrap(), SaveOutcome::Unchanged);
        assert_eq!(handle.current_head(), head);
        assert_eq!(m.history(&handle.id()).await.unwrap().len(), 1);
        // One payload, one commit.
        assert_eq!(m.store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn chain_length_matches_content_changes() {
        let m = ObjectStoreManager::in_memory();
        let mut handle = RecordHandle::initial(task("v0"));
        for i in 0..5 {
            handle.value_mut().title = format!("v{i}");
            m.save(&handle).await.unwrap();
            m.save(&handle).await.unwrap();
        }
        let chain = m.walk(handle.current_head().unwrap().commit_id).collect().await.unwrap();
        assert_eq!(chain.len(), 5);
        assert!(chain.last().unwrap().is_root());
    }

    async fn create_concurrently(m: Arc<ObjectStoreManager>, n: usize) {
        // Bounded so the on-disk runs stay under default open-file limits.
        let permits = Arc::new(tokio::sync::Semaphore::new(128));
        let mut tasks = Vec::with_capacity(n);
        for i in 0..n {
            let m = m.clone();
            let permits = permits.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.unwrap();
                let handle = RecordHandle::initial(task(&format!("task {i}")));
                m.save(&handle).await.unwrap()
            }));
        }
        for t in tasks {
            assert_eq!(t.await.unwrap(), SaveOutcome::Created);
        }
        assert_eq!(m.fetch_all::<Task>().await.unwrap().len(), n);
        assert_eq!(m.records(Some(Task::KIND)).await.unwrap().len(), n);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_creation_100_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let m = Arc::new(open_fs(dir.path(), StoreConfig::default()).await);
        create_concurrently(m, 100).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_creation_1000_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            fsync: false,
            ..StoreConfig::default()
        };
        let m = Arc::new(open_fs(dir.path(), config).await);
        create_concurrently(m, 1000).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_creation_10000_in_memory() {
        create_concurrently(Arc::new(ObjectStoreManager::in_memory()), 10_000).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_saves_on_one_record_form_a_chain() {
        let m = Arc::new(ObjectStoreManager::in_memory());
        let base = RecordHandle::initial(task("v0"));
        m.save(&base).await.unwrap();

        let mut tasks = Vec::new();
        for i in 1..=20 {
            let m = m.clone();
            let mut handle = base.clone();
            handle.value_mut().title = format!("v{i}");
            tasks.push(tokio::spawn(async move { m.save(&handle).await.unwrap() }));
        }
        for t in tasks {
            assert_eq!(t.await.unwrap(), SaveOutcome::Updated);
        }

        let chain = m
            .walk(base.current_head().unwrap().commit_id)
            .collect()
            .await
            .unwrap();
        assert_eq!(chain.len(), 21);
        assert!(chain.iter().all(|c| c.parents.len() <= 1));
        assert_eq!(m.history(&base.id()).await.unwrap().len(), 21);
    }

    #[tokio::test]
    async fn separately_fetched_handles_share_a_cell() {
        let m = ObjectStoreManager::in_memory();
        let id = {
            let handle = RecordHandle::initial(task("a"));
            m.save(&handle).await.unwrap();
            handle.id()
        };

        let mut a = m.fetch::<Task>(id).await.unwrap().unwrap();
        let mut b = m.fetch::<Task>(id).await.unwrap().unwrap();
        assert_eq!(a, b);

        a.value_mut().title = "from a".into();
        assert_eq!(m.save(&a).await.unwrap(), SaveOutcome::Updated);
        b.value_mut().title = "from b".into();
        assert_eq!(m.save(&b).await.unwrap(), SaveOutcome::Updated);

        let history = m.history(&id).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|c| !c.is_merge()));
    }

    #[tokio::test]
    async fn fetch_respects_kind() {
        let m = ObjectStoreManager::in_memory();
        let handle = RecordHandle::initial(task("typed"));
        m.save(&handle).await.unwrap();
        assert!(m.fetch::<Note>(handle.id()).await.unwrap().is_none());
        assert!(m.fetch_all::<Note>().await.unwrap().is_empty());
        assert!(m.fetch::<Task>(RecordId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_retires_every_handle() {
        let m = ObjectStoreManager::in_memory();
        let handle = RecordHandle::initial(task("doomed"));
        m.save(&handle).await.unwrap();
        let other = handle.clone();

        m.delete(&handle).await.unwrap();
        assert!(m.fetch::<Task>(handle.id()).await.unwrap().is_none());
        assert!(m.fetch_all::<Task>().await.unwrap().is_empty());
        assert!(matches!(
            m.save(&other).await,
            Err(SdkError::Deleted(id)) if id == handle.id()
        ));
        assert!(m.manifest.is_tombstoned(&handle.id()).await.unwrap());

        m.delete(&other).await.unwrap();
    }

    #[tokio::test]
    async fn shared_attachment_survives_until_last_reference() {
        let m = ObjectStoreManager::in_memory_with(eager());
        let audio = m.store_attachment(b"voice memo").await.unwrap();

        let mut first = task("first");
        first.audio = Some(audio);
        let mut second = task("second");
        second.audio = Some(audio);
        let a = RecordHandle::initial(first);
        let b = RecordHandle::initial(second);
        m.save(&a).await.unwrap();
        m.save(&b).await.unwrap();
        let a_payload = payload_of(&a);

        m.delete(&a).await.unwrap();
        assert!(m.retrieve_attachment(&audio).await.unwrap().is_some());
        assert!(m.retrieve_attachment(&a_payload).await.unwrap().is_none());

        m.delete(&b).await.unwrap();
        assert!(m.retrieve_attachment(&audio).await.unwrap().is_none());
        assert!(m.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn garbage_collect_respects_grace_window() {
        let m = ObjectStoreManager::in_memory();
        m.store_attachment(b"orphan").await.unwrap();
        let report = m.garbage_collect().await.unwrap();
        assert_eq!(report.swept, 0);
        assert_eq!(report.retained_young, 1);

        let m = ObjectStoreManager::in_memory_with(eager());
        let keep = RecordHandle::initial(task("keep"));
        m.save(&keep).await.unwrap();
        let orphan = m.store_attachment(b"orphan").await.unwrap();
        let report = m.garbage_collect().await.unwrap();
        assert_eq!(report.live_records, 1);
        assert_eq!(report.marked, 2);
        assert_eq!(report.swept, 1);
        assert!(m.retrieve_attachment(&orphan).await.unwrap().is_none());
        assert_eq!(m.fetch_all::<Task>().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_payload_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let m = open_fs(dir.path(), StoreConfig::default()).await;
        let handle = RecordHandle::initial(task("precious"));
        m.save(&handle).await.unwrap();
        let payload = payload_of(&handle);
        let path = m.path_of(&payload).await.unwrap();
        std::fs::write(&path, b"garbage").unwrap();

        let err = m.fetch_all::<Task>().await.unwrap_err();
        assert!(matches!(err, SdkError::Corrupt { id, .. } if id == payload));
        assert!(!path.exists());
        assert!(dir.path().join("quarantine").join(payload.to_hex()).is_file());
    }

    #[tokio::test]
    async fn missing_payload_is_skipped() {
        let m = ObjectStoreManager::in_memory();
        let kept = RecordHandle::initial(task("kept"));
        let lost = RecordHandle::initial(task("lost"));
        m.save(&kept).await.unwrap();
        m.save(&lost).await.unwrap();
        m.store.delete(&payload_of(&lost)).await.unwrap();

        let all = m.fetch_all::<Task>().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].value().title, "kept");
    }

    #[tokio::test]
    async fn attachment_paths() {
        let dir = tempfile::tempdir().unwrap();
        let m = open_fs(dir.path(), StoreConfig::default()).await;
        let id = m.store_attachment(b"RIFF audio").await.unwrap();

        let path = m.path_of(&id).await.unwrap();
        assert_eq!(path, dir.path().join("objects").join(id.shard()).join(id.to_hex()));

        let playable = m.materialize_attachment(&id, "wav").await.unwrap();
        assert_eq!(playable, dir.path().join("cache").join(format!("{id}.wav")));
        assert_eq!(std::fs::read(&playable).unwrap(), b"RIFF audio");

        let absent = ContentHash::from_digest([0; 32]);
        assert!(matches!(m.path_of(&absent).await, Err(SdkError::NotFound(_))));
        assert!(matches!(
            m.materialize_attachment(&absent, "wav").await,
            Err(SdkError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn in_memory_has_no_paths() {
        let m = ObjectStoreManager::in_memory();
        let id = m.store_attachment(b"bytes").await.unwrap();
        assert!(matches!(m.path_of(&id).await, Err(SdkError::Unsupported(_))));
        assert!(matches!(
            m.materialize_attachment(&id, "m4a").await,
            Err(SdkError::Unsupported(_))
        ));
        assert_eq!(m.retrieve_attachment(&id).await.unwrap().unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn verify_reports_corruption_and_dangling_heads() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            verify_reads: false,
            ..StoreConfig::default()
        };
        let m = open_fs(dir.path(), config).await;
        let handle = RecordHandle::initial(task("checked"));
        m.save(&handle).await.unwrap();
        assert!(m.verify().await.unwrap().is_clean());

        let payload = payload_of(&handle);
        std::fs::write(m.path_of(&payload).await.unwrap(), b"tampered").unwrap();
        let report = m.verify().await.unwrap();
        assert_eq!(report.objects_checked, 2);
        assert_eq!(report.corrupt, vec![payload]);
        assert_eq!(report.quarantined, vec![payload]);
        assert_eq!(report.dangling.len(), 1);
        assert_eq!(report.dangling[0].missing, vec![payload]);
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let m = ObjectStoreManager::init(dir.path()).await.unwrap();
            let mut handle = RecordHandle::initial(task("draft"));
            m.save(&handle).await.unwrap();
            handle.value_mut().done = true;
            m.save(&handle).await.unwrap();
            handle.id()
        };
        assert!(dir.path().join("blockset.toml").is_file());

        let m = ObjectStoreManager::open_at(dir.path()).await.unwrap();
        let handle = m.fetch::<Task>(id).await.unwrap().unwrap();
        assert!(handle.value().done);
        assert_eq!(m.history(&id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn open_at_reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blockset.toml"), "gc_grace_secs = 0\nverify_reads = false\n").unwrap();
        let m = ObjectStoreManager::open_at(dir.path()).await.unwrap();
        assert_eq!(m.config().gc_grace_secs, 0);
        assert!(!m.config().verify_reads);
        assert_eq!(m.root(), Some(dir.path()));
    }

    #[tokio::test]
    async fn bad_config_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blockset.toml"), "fsync = \"maybe\"\n").unwrap();
        assert!(matches!(
            ObjectStoreManager::open_at(dir.path()).await,
            Err(SdkError::Config(_))
        ));
    }

    #[derive(Debug, Deserialize)]
    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("no canonical form"))
        }
    }

    impl Record for Unencodable {
        const KIND: &'static str = "unencodable";
    }

    #[tokio::test]
    async fn unencodable_value_fails_save() {
        let m = ObjectStoreManager::in_memory();
        let handle = RecordHandle::initial(Unencodable);
        assert!(matches!(m.save(&handle).await, Err(SdkError::Encoding(_))));
        assert!(!handle.is_persisted());
        assert!(m.records(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_reloads_moved_head() {
        let m = ObjectStoreManager::in_memory();
        let a = RecordHandle::initial(task("one"));
        m.save(&a).await.unwrap();
        let mut stale = a.clone();
        let mut writer = a.clone();
        writer.value_mut().title = "two".into();
        m.save(&writer).await.unwrap();

        assert_eq!(stale.value().title, "one");
        m.refresh(&mut stale).await.unwrap();
        assert_eq!(stale.value().title, "two");

        let mut unsaved = RecordHandle::initial(task("never"));
        assert!(matches!(m.refresh(&mut unsaved).await, Err(SdkError::NotFound(_))));
    }

    #[tokio::test]
    async fn history_of_unknown_record_is_not_found() {
        let m = ObjectStoreManager::in_memory();
        assert!(matches!(
            m.history(&RecordId::new()).await,
            Err(SdkError::NotFound(_))
        ));
    }

    /// Manifest whose writes land at once but return only after `delay`.
    struct SlowWrites {
        inner: InMemoryManifest,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl ManifestStore for SlowWrites {
        async fn read(
            &self,
            kind: &str,
            record_id: &RecordId,
        ) -> blockset_manifest::Result<Option<ManifestEntry>> {
            self.inner.read(kind, record_id).await
        }

        async fn write(&self, entry: &ManifestEntry) -> blockset_manifest::Result<()> {
            self.inner.write(entry).await?;
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn remove(&self, kind: &str, record_id: &RecordId) -> blockset_manifest::Result<bool> {
            self.inner.remove(kind, record_id).await
        }

        async fn list(&self, kind: &str) -> blockset_manifest::Result<Vec<ManifestEntry>> {
            self.inner.list(kind).await
        }

        async fn list_all(&self) -> blockset_manifest::Result<Vec<ManifestEntry>> {
            self.inner.list_all().await
        }

        async fn tombstone(&self, tombstone: &Tombstone) -> blockset_manifest::Result<()> {
            self.inner.tombstone(tombstone).await
        }

        async fn is_tombstoned(&self, record_id: &RecordId) -> blockset_manifest::Result<bool> {
            self.inner.is_tombstoned(record_id).await
        }

        async fn tombstones(&self) -> blockset_manifest::Result<Vec<Tombstone>> {
            self.inner.tombstones().await
        }
    }

    fn with_slow_manifest(delay: Duration) -> ObjectStoreManager {
        ObjectStoreManager::assemble(
            None,
            StoreConfig::default(),
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(SlowWrites {
                inner: InMemoryManifest::new(),
                delay,
            }),
            None,
        )
    }

    #[tokio::test]
    async fn fetch_during_first_save_joins_the_saving_cell() {
        let m = Arc::new(with_slow_manifest(Duration::from_millis(100)));
        let mut a = RecordHandle::initial(task("first"));
        let saving = tokio::spawn({
            let m = m.clone();
            let a = a.clone();
            async move { m.save(&a).await.unwrap() }
        });

        // The manifest entry exists but the save has not returned yet.
        tokio::time::sleep(Duration::from_millis(30)).await;
        let mut b = m.fetch_all::<Task>().await.unwrap().remove(0);
        assert_eq!(saving.await.unwrap(), SaveOutcome::Created);
        assert_eq!(b, a);
        assert_eq!(b.current_head(), a.current_head());

        a.value_mut().title = "from a".into();
        m.save(&a).await.unwrap();
        b.value_mut().title = "from b".into();
        m.save(&b).await.unwrap();

        let history = m.history(&a.id()).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].parents, vec![history[1].id]);
        let fetched = m.fetch::<Task>(a.id()).await.unwrap().unwrap();
        assert_eq!(fetched.value().title, "from b");
    }

    #[tokio::test]
    async fn save_dropped_after_manifest_write_is_caught_up() {
        let m = with_slow_manifest(Duration::from_millis(100));
        let mut a = RecordHandle::initial(task("one"));
        m.save(&a).await.unwrap();
        let first = a.current_head().unwrap();

        a.value_mut().title = "two".into();
        let dropped = tokio::time::timeout(Duration::from_millis(30), m.save(&a)).await;
        assert!(dropped.is_err());
        assert_eq!(a.current_head(), Some(first));
        let durable = m.records(Some(Task::KIND)).await.unwrap()[0].head;
        assert_ne!(durable, first);

        assert_eq!(m.save(&a).await.unwrap(), SaveOutcome::Unchanged);
        assert_eq!(a.current_head(), Some(durable));

        a.value_mut().title = "three".into();
        assert_eq!(m.save(&a).await.unwrap(), SaveOutcome::Updated);
        let head = a.current_head().unwrap();
        let ids: Vec<ContentHash> = m
            .history(&a.id())
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![head.commit_id, durable.commit_id, first.commit_id]);
    }

    #[tokio::test]
    async fn delete_dropped_before_retire_still_blocks_saves() {
        let m = ObjectStoreManager::in_memory();
        let handle = RecordHandle::initial(task("gone"));
        m.save(&handle).await.unwrap();

        // Tombstone and entry removal are durable, the cell never retired.
        m.manifest
            .tombstone(&Tombstone::new(handle.id(), Task::KIND, handle.current_head()))
            .await
            .unwrap();
        m.manifest.remove(Task::KIND, &handle.id()).await.unwrap();

        assert!(matches!(m.save(&handle).await, Err(SdkError::Deleted(id)) if id == handle.id()));
        assert!(handle.cell().is_retired());
        assert!(m.records(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn garbage_collect_removes_cached_copies() {
        let dir = tempfile::tempdir().unwrap();
        let m = open_fs(dir.path(), eager()).await;
        let orphan = m.store_attachment(b"dropped recording").await.unwrap();
        let copy = m.materialize_attachment(&orphan, "m4a").await.unwrap();
        assert!(copy.is_file());

        let report = m.garbage_collect().await.unwrap();
        assert_eq!(report.swept, 1);
        assert_eq!(report.cache_files_removed, 1);
        assert!(!copy.exists());
        assert!(!dir
            .path()
            .join("objects")
            .join(orphan.shard())
            .join(orphan.to_hex())
            .exists());
    }
}
