use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use blockset_types::ContentHash;

use crate::error::StoreResult;

/// Listing entry for one stored object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectMeta {
    pub id: ContentHash,
    pub size: u64,
    /// Last write, or last re-store of identical content.
    pub modified: SystemTime,
}

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written. The same bytes always produce the
///   same id.
/// - A write is either fully visible under its final id or not visible at all.
/// - Concurrent reads and writes are always safe; writes of the same content
///   commute.
/// - The store never interprets object contents.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes and return their content hash.
    ///
    /// If the object already exists nothing is rewritten, but its
    /// modification time is refreshed so garbage collection treats it as
    /// recently used.
    async fn store(&self, data: &[u8]) -> StoreResult<ContentHash>;

    /// Read an object by its content hash.
    ///
    /// Returns `Ok(None)` if the object has never been stored locally.
    /// Returns `Err(CorruptObject)` if the bytes fail verification; the
    /// object is quarantined before the error is returned.
    async fn retrieve(&self, id: &ContentHash) -> StoreResult<Option<Vec<u8>>>;

    /// Check whether an object exists in the store.
    async fn exists(&self, id: &ContentHash) -> StoreResult<bool>;

    /// Delete an object by id. Returns `true` if the object existed.
    ///
    /// This is intended for garbage collection only. Deletion of
    /// referenced objects corrupts the store.
    async fn delete(&self, id: &ContentHash) -> StoreResult<bool>;

    /// Size and modification time of one object, `None` if absent.
    async fn meta(&self, id: &ContentHash) -> StoreResult<Option<ObjectMeta>>;

    /// List every object currently in the pool (quarantined objects excluded).
    async fn list(&self) -> StoreResult<Vec<ObjectMeta>>;

    /// Move an object out of the pool into quarantine. Returns `true` if the
    /// object existed.
    async fn quarantine(&self, id: &ContentHash) -> StoreResult<bool>;

    /// Ids currently held in quarantine.
    async fn quarantined(&self) -> StoreResult<Vec<ContentHash>>;

    /// Deterministic on-disk location of an object, whether or not it exists.
    ///
    /// `None` for backends that do not keep objects in files.
    fn path_of(&self, id: &ContentHash) -> Option<PathBuf>;

    /// Remove leftovers of interrupted writes older than `older_than`.
    /// Returns the number of files removed.
    async fn clean_partials(&self, _older_than: Duration) -> StoreResult<usize> {
        Ok(0)
    }

    /// Read multiple objects in a batch.
    ///
    /// Default implementation calls `retrieve()` for each id.
    async fn retrieve_batch(&self, ids: &[ContentHash]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.retrieve(id).await?);
        }
        Ok(out)
    }
}
