//! Content-addressed object storage for BlockSet.
//!
//! This crate implements the hash-keyed object pool that holds every
//! immutable object in a store: record payload snapshots, binary attachments
//! (voice recordings, photos) and serialized commits. Each object is
//! identified by the domain-separated BLAKE3 hash of its bytes.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`FsObjectStore`] -- sharded on-disk pool (`objects/<ab>/<hash>`)
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Writes go to a temporary file and are renamed into place, so a crash
//!    never leaves a partially-written object under its final name.
//! 3. Storing identical bytes twice is a no-op write with the same identity.
//! 4. Objects are only deleted by garbage collection.
//! 5. A read whose bytes do not hash to the requested id quarantines the
//!    object and reports corruption instead of returning the bytes.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::{atomic_write, FsObjectStore, FsStoreOptions};
pub use memory::InMemoryObjectStore;
pub use traits::{ObjectMeta, ObjectStore};
