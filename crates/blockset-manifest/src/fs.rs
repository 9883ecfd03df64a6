//! Filesystem manifest: one JSON file per record.
//!
//! ```text
//! manifest/<kind>/<record-id>.json
//! tombstones/<record-id>.json
//! ```
//!
//! Every file is replaced through an atomic rename, so a crash leaves either
//! the previous head or the new one. Records never share a file, so writers
//! of different records never contend.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use blockset_store::atomic_write;
use blockset_types::RecordId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::entry::{ManifestEntry, Tombstone};
use crate::error::{ManifestError, Result};
use crate::names::validate_kind;
use crate::traits::ManifestStore;

const MANIFEST_DIR: &str = "manifest";
const TOMBSTONE_DIR: &str = "tombstones";
const TMP_DIR: &str = "tmp";

/// A [`ManifestStore`] persisted under a store root.
#[derive(Debug)]
pub struct FsManifest {
    root: PathBuf,
    fsync: bool,
}

impl FsManifest {
    /// Open (creating if needed) the manifest under `root`.
    pub async fn open(root: impl Into<PathBuf>, fsync: bool) -> Result<Self> {
        let root = root.into();
        for dir in [MANIFEST_DIR, TOMBSTONE_DIR, TMP_DIR] {
            fs::create_dir_all(root.join(dir)).await?;
        }
        Ok(Self { root, fsync })
    }

    fn kind_dir(&self, kind: &str) -> PathBuf {
        self.root.join(MANIFEST_DIR).join(kind)
    }

    fn entry_path(&self, kind: &str, record_id: &RecordId) -> PathBuf {
        self.kind_dir(kind).join(format!("{record_id}.json"))
    }

    fn tombstone_path(&self, record_id: &RecordId) -> PathBuf {
        self.root.join(TOMBSTONE_DIR).join(format!("{record_id}.json"))
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| ManifestError::Serialization(e.to_string()))?;
        atomic_write(&self.root.join(TMP_DIR), path, &bytes, self.fsync).await?;
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| ManifestError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Decode every `*.json` file directly inside `dir`.
async fn read_all<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut out = Vec::new();
    let mut rd = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        // A concurrent remove between listing and reading is not an error.
        if let Some(value) = read_json(&path).await? {
            out.push(value);
        }
    }
    Ok(out)
}

#[async_trait]
impl ManifestStore for FsManifest {
    async fn read(&self, kind: &str, record_id: &RecordId) -> Result<Option<ManifestEntry>> {
        validate_kind(kind)?;
        read_json(&self.entry_path(kind, record_id)).await
    }

    async fn write(&self, entry: &ManifestEntry) -> Result<()> {
        validate_kind(&entry.kind)?;
        self.write_json(&self.entry_path(&entry.kind, &entry.record_id), entry)
            .await?;
        debug!(record = %entry.record_id, kind = %entry.kind, head = ?entry.head, "manifest updated");
        Ok(())
    }

    async fn remove(&self, kind: &str, record_id: &RecordId) -> Result<bool> {
        validate_kind(kind)?;
        match fs::remove_file(self.entry_path(kind, record_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, kind: &str) -> Result<Vec<ManifestEntry>> {
        validate_kind(kind)?;
        let mut entries: Vec<ManifestEntry> = read_all(&self.kind_dir(kind)).await?;
        entries.sort_by(|a, b| a.record_id.cmp(&b.record_id));
        Ok(entries)
    }

    async fn list_all(&self) -> Result<Vec<ManifestEntry>> {
        let mut entries = Vec::new();
        let mut rd = fs::read_dir(self.root.join(MANIFEST_DIR)).await?;
        while let Some(dir) = rd.next_entry().await? {
            if dir.file_type().await?.is_dir() {
                entries.extend(read_all::<ManifestEntry>(&dir.path()).await?);
            }
        }
        entries.sort_by(|a, b| a.record_id.cmp(&b.record_id));
        Ok(entries)
    }

    async fn tombstone(&self, tombstone: &Tombstone) -> Result<()> {
        self.write_json(&self.tombstone_path(&tombstone.record_id), tombstone)
            .await
    }

    async fn is_tombstoned(&self, record_id: &RecordId) -> Result<bool> {
        Ok(fs::try_exists(self.tombstone_path(record_id)).await?)
    }

    async fn tombstones(&self) -> Result<Vec<Tombstone>> {
        let mut out: Vec<Tombstone> = read_all(&self.root.join(TOMBSTONE_DIR)).await?;
        out.sort_by(|a, b| a.record_id.cmp(&b.record_id));
        Ok(out)
    }
}
