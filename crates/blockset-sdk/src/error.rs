use blockset_cell::CellError;
use blockset_crypto::HasherError;
use blockset_dag::DagError;
use blockset_manifest::ManifestError;
use blockset_merge::MergeError;
use blockset_store::StoreError;
use blockset_sync::SyncError;
use blockset_types::{ContentHash, RecordId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    /// A value could not be canonically encoded, or a payload could not be
    /// decoded into the requested type.
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    /// An object failed verification and has been quarantined.
    #[error("corrupt object {id}: content hashes to {computed}")]
    Corrupt {
        id: ContentHash,
        computed: ContentHash,
    },

    /// Two heads diverged and the merge policy could not reconcile them.
    #[error("divergent history: {0}")]
    DivergentHistory(String),

    /// The record was deleted.
    #[error("record {0} was deleted")]
    Deleted(RecordId),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The operation needs a capability the backend lacks.
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("commit log error: {0}")]
    Dag(DagError),

    #[error("manifest error: {0}")]
    Manifest(ManifestError),

    #[error("cell error: {0}")]
    Cell(#[from] CellError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

pub type SdkResult<T> = Result<T, SdkError>;

impl From<StoreError> for SdkError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound(format!("object {id}")),
            StoreError::CorruptObject { id, computed } => Self::Corrupt { id, computed },
            StoreError::Io(e) => Self::Io(e),
        }
    }
}

impl From<HasherError> for SdkError {
    fn from(e: HasherError) -> Self {
        Self::Encoding(e.to_string())
    }
}

impl From<DagError> for SdkError {
    fn from(e: DagError) -> Self {
        match e {
            DagError::NotFound(id) => Self::NotFound(format!("commit {id}")),
            DagError::Store(e) => e.into(),
            DagError::Encoding(e) => e.into(),
            e @ DagError::Decode { .. } => Self::Dag(e),
        }
    }
}

impl From<ManifestError> for SdkError {
    fn from(e: ManifestError) -> Self {
        match e {
            ManifestError::Io(e) => Self::Io(e),
            e => Self::Manifest(e),
        }
    }
}

impl From<MergeError> for SdkError {
    fn from(e: MergeError) -> Self {
        Self::DivergentHistory(e.to_string())
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_objects_keep_their_ids() {
        let id = ContentHash::from_digest([1; 32]);
        let computed = ContentHash::from_digest([2; 32]);
        let err: SdkError = DagError::Store(StoreError::CorruptObject { id, computed }).into();
        assert!(matches!(err, SdkError::Corrupt { id: a, computed: b } if a == id && b == computed));
    }

    #[test]
    fn encoding_failures_are_encoding_errors() {
        let err: SdkError = HasherError::Encoding("key must be a string".into()).into();
        assert!(matches!(err, SdkError::Encoding(_)));
    }

    #[test]
    fn merge_failures_are_divergent_history() {
        let err: SdkError = MergeError::Irreconcilable("schema changed".into()).into();
        assert!(matches!(err, SdkError::DivergentHistory(_)));
    }
}
