//! Error types for the commit log.

use blockset_crypto::HasherError;
use blockset_store::StoreError;
use blockset_types::ContentHash;

/// Errors that can occur during commit log operations.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    /// A referenced commit is not in the local object pool.
    #[error("commit not found: {0}")]
    NotFound(ContentHash),

    /// The object exists but is not a commit.
    #[error("object {id} is not a commit: {reason}")]
    Decode { id: ContentHash, reason: String },

    #[error(transparent)]
    Encoding(#[from] HasherError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience alias for commit log results.
pub type DagResult<T> = Result<T, DagError>;
