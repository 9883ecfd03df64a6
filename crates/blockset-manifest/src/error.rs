//! Error types for manifest operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The record kind cannot be used as a manifest partition.
    #[error("invalid record kind {kind:?}: {reason}")]
    InvalidKind { kind: String, reason: String },

    /// A manifest file exists but does not decode.
    #[error("corrupt manifest file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    /// A lock guarding in-memory state was poisoned.
    #[error("lock poisoned: {0}")]
    Poisoned(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for manifest operations.
pub type Result<T> = std::result::Result<T, ManifestError>;
