use blockset_crypto::{to_canonical_vec, HasherError};
use blockset_types::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::{DagError, DagResult};

/// Stored form of a commit. The id is not part of it: it is the hash of
/// these bytes.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommitBody {
    parents: Vec<ContentHash>,
    payload: Option<ContentHash>,
}

/// An immutable point in a record's history.
#[derive(Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: ContentHash,
    pub parents: Vec<ContentHash>,
    pub payload: Option<ContentHash>,
}

impl Commit {
    /// Canonical bytes for a commit with the given parents and payload.
    pub fn encode(parents: &[ContentHash], payload: Option<ContentHash>) -> Result<Vec<u8>, HasherError> {
        to_canonical_vec(&CommitBody {
            parents: parents.to_vec(),
            payload,
        })
    }

    /// Decode the stored bytes of commit `id`.
    pub fn decode(id: ContentHash, bytes: &[u8]) -> DagResult<Self> {
        let body: CommitBody = serde_json::from_slice(bytes).map_err(|e| DagError::Decode {
            id,
            reason: e.to_string(),
        })?;
        Ok(Self {
            id,
            parents: body.parents,
            payload: body.payload,
        })
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn first_parent(&self) -> Option<&ContentHash> {
        self.parents.first()
    }
}

impl std::fmt::Debug for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commit")
            .field("id", &self.id)
            .field("parents", &self.parents)
            .field("payload", &self.payload)
            .finish()
    }
}
