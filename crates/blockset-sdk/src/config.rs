use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Store tuning, read from `<root>/blockset.toml` when present.
///
/// The store root itself is never part of the file; it is always passed in
/// by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Re-hash objects on every read.
    pub verify_reads: bool,
    /// `fsync` object and manifest files before renaming them into place.
    pub fsync: bool,
    /// Minimum age before an unreferenced object may be collected.
    pub gc_grace_secs: u64,
    /// Collect a record's unreferenced objects as soon as it is deleted.
    pub collect_on_delete: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            verify_reads: true,
            fsync: true,
            gc_grace_secs: 3600,
            collect_on_delete: true,
        }
    }
}

impl StoreConfig {
    pub const FILE_NAME: &'static str = "blockset.toml";

    pub fn gc_grace(&self) -> Duration {
        Duration::from_secs(self.gc_grace_secs)
    }

    pub fn from_toml_str(s: &str) -> SdkResult<Self> {
        toml::from_str(s).map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    /// Load `<root>/blockset.toml`, falling back to defaults if it is absent.
    pub async fn load(root: &Path) -> SdkResult<Self> {
        match tokio::fs::read_to_string(root.join(Self::FILE_NAME)).await {
            Ok(s) => Self::from_toml_str(&s),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}
