use std::io;
use std::path::PathBuf;

use blockset_store::atomic_write;
use blockset_types::ContentHash;
use tokio::fs;
use tracing::debug;

use crate::error::{SdkError, SdkResult};

const MAX_EXTENSION_LEN: usize = 16;

/// Read-through copies of attachments under friendly file names
/// (`cache/<hash>.<ext>`), for consumers that need a real extension, such as
/// audio players.
///
/// Cache files are derived data: they can be deleted at any time and are
/// recreated on the next request.
#[derive(Debug)]
pub struct AttachmentCache {
    dir: PathBuf,
    tmp_dir: PathBuf,
}

impl AttachmentCache {
    pub async fn open(dir: PathBuf, tmp_dir: PathBuf) -> SdkResult<Self> {
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir, tmp_dir })
    }

    pub fn path_for(&self, id: &ContentHash, extension: &str) -> SdkResult<PathBuf> {
        validate_extension(extension)?;
        Ok(self.dir.join(format!("{id}.{extension}")))
    }

    /// Path of the cached copy, writing `data` there first if needed.
    pub async fn materialize(&self, id: &ContentHash, extension: &str, data: &[u8]) -> SdkResult<PathBuf> {
        let path = self.path_for(id, extension)?;
        if !fs::try_exists(&path).await? {
            atomic_write(&self.tmp_dir, &path, data, false).await?;
            debug!(%id, path = %path.display(), "materialized attachment");
        }
        Ok(path)
    }

    /// Remove every cached copy of `id`. Returns the number removed.
    pub async fn evict(&self, id: &ContentHash) -> SdkResult<usize> {
        let mut removed = 0;
        for path in self.copies_of(id).await? {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    async fn copies_of(&self, id: &ContentHash) -> SdkResult<Vec<PathBuf>> {
        let prefix = format!("{id}.");
        let mut out = Vec::new();
        let mut rd = fs::read_dir(&self.dir).await?;
        while let Some(entry) = rd.next_entry().await? {
            if entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(&prefix))
            {
                out.push(entry.path());
            }
        }
        Ok(out)
    }
}

fn validate_extension(extension: &str) -> SdkResult<()> {
    let valid = !extension.is_empty()
        && extension.len() <= MAX_EXTENSION_LEN
        && extension.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(SdkError::InvalidArgument(format!(
            "attachment extension {extension:?} must be 1-16 ASCII letters or digits"
        )))
    }
}
