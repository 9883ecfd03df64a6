//! The head manifest: which commit each live record currently points at.
//!
//! The manifest is the only mutable state in a BlockSet store besides the
//! mutation cells that front it. Each record has one [`ManifestEntry`]
//! naming its kind and [`HeadPointer`](blockset_types::HeadPointer); deleted
//! records leave a [`Tombstone`] behind so that sync does not resurrect them.
//!
//! # Modules
//!
//! - [`error`]: Error types for manifest operations
//! - [`entry`]: [`ManifestEntry`] and [`Tombstone`]
//! - [`traits`]: The [`ManifestStore`] trait defining the storage interface
//! - [`names`]: Record kind validation
//! - [`memory`]: In-memory [`InMemoryManifest`] for tests
//! - [`fs`]: One-file-per-record [`FsManifest`]

pub mod entry;
pub mod error;
pub mod fs;
pub mod memory;
pub mod names;
pub mod traits;

pub use entry::{now_ms, ManifestEntry, Tombstone};
pub use error::{ManifestError, Result};
pub use fs::FsManifest;
pub use memory::InMemoryManifest;
pub use names::validate_kind;
pub use traits::ManifestStore;
