use blockset_types::ContentHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote does not hold an object its heads reference.
    #[error("remote is missing object {0}")]
    MissingObject(ContentHash),

    /// Received bytes do not hash to the requested id.
    #[error("object {expected} failed verification: received bytes hash to {actual}")]
    VerificationFailed {
        expected: ContentHash,
        actual: ContentHash,
    },

    /// The remote answered with a different number of objects than requested.
    #[error("remote returned {actual} objects for {requested} requested")]
    ShortResponse { requested: usize, actual: usize },
}

pub type SyncResult<T> = Result<T, SyncError>;
