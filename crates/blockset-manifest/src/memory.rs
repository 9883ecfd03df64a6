//! In-memory manifest for testing and ephemeral stores.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use blockset_types::RecordId;

use crate::entry::{ManifestEntry, Tombstone};
use crate::error::{ManifestError, Result};
use crate::names::validate_kind;
use crate::traits::ManifestStore;

/// An in-memory implementation of [`ManifestStore`].
///
/// All data lives in `HashMap`s behind `RwLock`s and is lost when the
/// manifest is dropped.
#[derive(Debug, Default)]
pub struct InMemoryManifest {
    entries: RwLock<HashMap<RecordId, ManifestEntry>>,
    tombstones: RwLock<HashMap<RecordId, Tombstone>>,
}

impl InMemoryManifest {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> ManifestError {
    ManifestError::Poisoned(e.to_string())
}

fn sorted(mut entries: Vec<ManifestEntry>) -> Vec<ManifestEntry> {
    entries.sort_by(|a, b| a.record_id.cmp(&b.record_id));
    entries
}

#[async_trait]
impl ManifestStore for InMemoryManifest {
    async fn read(&self, kind: &str, record_id: &RecordId) -> Result<Option<ManifestEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(record_id).filter(|e| e.kind == kind).cloned())
    }

    async fn write(&self, entry: &ManifestEntry) -> Result<()> {
        validate_kind(&entry.kind)?;
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(entry.record_id, entry.clone());
        Ok(())
    }

    async fn remove(&self, kind: &str, record_id: &RecordId) -> Result<bool> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        if entries.get(record_id).is_some_and(|e| e.kind == kind) {
            entries.remove(record_id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn list(&self, kind: &str) -> Result<Vec<ManifestEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(sorted(
            entries.values().filter(|e| e.kind == kind).cloned().collect(),
        ))
    }

    async fn list_all(&self) -> Result<Vec<ManifestEntry>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(sorted(entries.values().cloned().collect()))
    }

    async fn tombstone(&self, tombstone: &Tombstone) -> Result<()> {
        self.tombstones
            .write()
            .map_err(poisoned)?
            .insert(tombstone.record_id, tombstone.clone());
        Ok(())
    }

    async fn is_tombstoned(&self, record_id: &RecordId) -> Result<bool> {
        Ok(self.tombstones.read().map_err(poisoned)?.contains_key(record_id))
    }

    async fn tombstones(&self) -> Result<Vec<Tombstone>> {
        let mut out: Vec<Tombstone> = self.tombstones.read().map_err(poisoned)?.values().cloned().collect();
        out.sort_by(|a, b| a.record_id.cmp(&b.record_id));
        Ok(out)
    }

    async fn find(&self, record_id: &RecordId) -> Result<Option<ManifestEntry>> {
        Ok(self.entries.read().map_err(poisoned)?.get(record_id).cloned())
    }
}
