use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use blockset_crypto::ContentHasher;
use blockset_types::ContentHash;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectMeta, ObjectStore};

const OBJECTS_DIR: &str = "objects";
const TMP_DIR: &str = "tmp";
const QUARANTINE_DIR: &str = "quarantine";
const PARTIAL_SUFFIX: &str = ".partial";

/// Tuning knobs for [`FsObjectStore`].
#[derive(Clone, Copy, Debug)]
pub struct FsStoreOptions {
    /// Re-hash every object on read.
    pub verify_reads: bool,
    /// `fsync` object files before they are renamed into place.
    pub fsync: bool,
}

impl Default for FsStoreOptions {
    fn default() -> Self {
        Self {
            verify_reads: true,
            fsync: true,
        }
    }
}

/// Write `data` to `dest` atomically.
///
/// The bytes land in a uniquely named file under `tmp_dir` first and are
/// renamed over `dest` only once fully written, so readers observe either the
/// old file, no file, or the complete new file. `tmp_dir` must be on the same
/// filesystem as `dest`. A dropped future leaves at most a `*.partial` file
/// behind.
pub async fn atomic_write(tmp_dir: &Path, dest: &Path, data: &[u8], fsync: bool) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::create_dir_all(tmp_dir).await?;

    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("object");
    let tmp = tmp_dir.join(format!("{name}.{}{PARTIAL_SUFFIX}", uuid::Uuid::now_v7().simple()));

    let written = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.flush().await?;
        if fsync {
            file.sync_all().await?;
        }
        Ok::<_, io::Error>(())
    }
    .await;

    let result = match written {
        Ok(()) => fs::rename(&tmp, dest).await,
        Err(e) => Err(e),
    };
    if result.is_err() {
        let _ = fs::remove_file(&tmp).await;
    }
    result
}

/// On-disk content-addressed pool.
///
/// Layout under the store root:
///
/// ```text
/// objects/<ab>/<hash>    one file per object, sharded by first hash byte
/// tmp/                   in-flight writes
/// quarantine/<hash>      objects that failed verification
/// ```
pub struct FsObjectStore {
    root: PathBuf,
    options: FsStoreOptions,
}

impl FsObjectStore {
    /// Open (creating if needed) the pool rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>, options: FsStoreOptions) -> StoreResult<Self> {
        let root = root.into();
        for dir in [OBJECTS_DIR, TMP_DIR, QUARANTINE_DIR] {
            fs::create_dir_all(root.join(dir)).await?;
        }
        debug!(root = %root.display(), ?options, "opened object store");
        Ok(Self { root, options })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> FsStoreOptions {
        self.options
    }

    /// Final location of an object.
    pub fn object_path(&self, id: &ContentHash) -> PathBuf {
        self.root
            .join(OBJECTS_DIR)
            .join(id.shard())
            .join(id.to_hex())
    }

    fn quarantine_path(&self, id: &ContentHash) -> PathBuf {
        self.root.join(QUARANTINE_DIR).join(id.to_hex())
    }

    fn tmp_dir(&self) -> PathBuf {
        self.root.join(TMP_DIR)
    }
}

/// Bump a file's modification time to now. A file whose time we may not
/// change (read-only, owned by someone else) is left as it is.
async fn touch(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path)?;
        match file.set_modified(SystemTime::now()) {
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                warn!(path = %path.display(), "cannot refresh modification time");
                Ok(())
            }
            other => other,
        }
    })
    .await
    .map_err(io::Error::other)?
}

async fn read_dir_entries(dir: &Path) -> io::Result<Vec<fs::DirEntry>> {
    let mut entries = Vec::new();
    let mut rd = match fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
        Err(e) => return Err(e),
    };
    while let Some(entry) = rd.next_entry().await? {
        entries.push(entry);
    }
    Ok(entries)
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn store(&self, data: &[u8]) -> StoreResult<ContentHash> {
        let id = ContentHasher::OBJECT.hash(data);
        let dest = self.object_path(&id);

        match touch(&dest).await {
            Ok(()) => {
                debug!(%id, "object already present");
                return Ok(id);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        atomic_write(&self.tmp_dir(), &dest, data, self.options.fsync).await?;
        debug!(%id, size = data.len(), "stored object");
        Ok(id)
    }

    async fn retrieve(&self, id: &ContentHash) -> StoreResult<Option<Vec<u8>>> {
        let data = match fs::read(self.object_path(id)).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if self.options.verify_reads {
            let computed = ContentHasher::OBJECT.hash(&data);
            if computed != *id {
                warn!(%id, %computed, "object failed verification, quarantining");
                self.quarantine(id).await?;
                return Err(StoreError::CorruptObject { id: *id, computed });
            }
        }
        Ok(Some(data))
    }

    async fn exists(&self, id: &ContentHash) -> StoreResult<bool> {
        Ok(fs::try_exists(self.object_path(id)).await?)
    }

    async fn delete(&self, id: &ContentHash) -> StoreResult<bool> {
        match fs::remove_file(self.object_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn meta(&self, id: &ContentHash) -> StoreResult<Option<ObjectMeta>> {
        match fs::metadata(self.object_path(id)).await {
            Ok(meta) => Ok(Some(ObjectMeta {
                id: *id,
                size: meta.len(),
                modified: meta.modified()?,
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> StoreResult<Vec<ObjectMeta>> {
        let mut out = Vec::new();
        for shard in read_dir_entries(&self.root.join(OBJECTS_DIR)).await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            for entry in read_dir_entries(&shard.path()).await? {
                let name = entry.file_name();
                let Some(id) = name.to_str().and_then(|n| n.parse::<ContentHash>().ok()) else {
                    warn!(path = %entry.path().display(), "ignoring stray file in object pool");
                    continue;
                };
                let meta = match entry.metadata().await {
                    Ok(meta) => meta,
                    // Removed by a concurrent sweep.
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(e.into()),
                };
                out.push(ObjectMeta {
                    id,
                    size: meta.len(),
                    modified: meta.modified()?,
                });
            }
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn quarantine(&self, id: &ContentHash) -> StoreResult<bool> {
        match fs::rename(self.object_path(id), self.quarantine_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn quarantined(&self) -> StoreResult<Vec<ContentHash>> {
        let mut ids: Vec<ContentHash> = read_dir_entries(&self.root.join(QUARANTINE_DIR))
            .await?
            .iter()
            .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse().ok()))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn path_of(&self, id: &ContentHash) -> Option<PathBuf> {
        Some(self.object_path(id))
    }

    async fn clean_partials(&self, older_than: Duration) -> StoreResult<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in read_dir_entries(&self.tmp_dir()).await? {
            let is_partial = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.ends_with(PARTIAL_SUFFIX));
            if !is_partial {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age >= older_than && fs::remove_file(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "cleaned interrupted writes");
        }
        Ok(removed)
    }
}
