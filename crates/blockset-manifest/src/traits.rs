//! The [`ManifestStore`] trait defining the manifest storage interface.

use async_trait::async_trait;
use blockset_types::RecordId;

use crate::entry::{ManifestEntry, Tombstone};
use crate::error::Result;

/// Storage backend for record heads and tombstones.
///
/// Implementations must be thread-safe and make each single-entry write
/// atomic. Writes to different records must not contend on a shared
/// critical section. Callers serialize writes to the same record (through
/// its mutation cell).
#[async_trait]
pub trait ManifestStore: Send + Sync {
    /// Read the entry of `record_id` in partition `kind`.
    ///
    /// Returns `Ok(None)` if the record has no entry.
    async fn read(&self, kind: &str, record_id: &RecordId) -> Result<Option<ManifestEntry>>;

    /// Create or replace an entry.
    async fn write(&self, entry: &ManifestEntry) -> Result<()>;

    /// Remove an entry. Returns `Ok(true)` if it existed.
    async fn remove(&self, kind: &str, record_id: &RecordId) -> Result<bool>;

    /// All entries of one kind, ordered by record id.
    async fn list(&self, kind: &str) -> Result<Vec<ManifestEntry>>;

    /// All entries of every kind, ordered by record id.
    async fn list_all(&self) -> Result<Vec<ManifestEntry>>;

    /// Record that `record_id` was deleted.
    async fn tombstone(&self, tombstone: &Tombstone) -> Result<()>;

    async fn is_tombstoned(&self, record_id: &RecordId) -> Result<bool>;

    async fn tombstones(&self) -> Result<Vec<Tombstone>>;

    /// Find an entry when the kind is not known.
    async fn find(&self, record_id: &RecordId) -> Result<Option<ManifestEntry>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .find(|e| e.record_id == *record_id))
    }
}
