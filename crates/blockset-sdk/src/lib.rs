//! High-level API for BlockSet.
//!
//! [`ObjectStoreManager`] is the entry point for applications. It saves and
//! fetches versioned records through [`RecordHandle`]s, stores binary
//! attachments, collects garbage and syncs with remote replicas. Everything
//! below it (hashing, the object pool, commit history, the manifest, cells)
//! is reachable through the re-exports for tools that need it.

pub mod cache;
pub mod config;
pub mod error;
pub mod gc;
pub mod manager;
pub mod sync;

pub use cache::AttachmentCache;
pub use config::StoreConfig;
pub use error::{SdkError, SdkResult};
pub use gc::{DanglingHead, FsckReport, GcReport};
pub use manager::{ObjectStoreManager, SaveOutcome};

// Re-export key types
pub use blockset_cell::{Record, RecordHandle};
pub use blockset_dag::{Commit, Walk};
pub use blockset_manifest::ManifestEntry;
pub use blockset_merge::{FieldMerge, MergePolicy, PreferLocal, PreferRemote};
pub use blockset_sync::{InMemoryRemote, PullOutcome, SyncReport, SyncTransport};
pub use blockset_types::{ContentHash, HeadPointer, RecordId};
