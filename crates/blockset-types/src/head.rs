use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// The current position of one logical record: its head commit and the
/// payload that commit references.
///
/// The payload id is carried alongside the commit id so that a fetch can go
/// straight from the manifest to the payload blob, and a save can detect an
/// unchanged value without reading the commit back.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeadPointer {
    pub commit_id: ContentHash,
    pub payload_id: Option<ContentHash>,
}

impl HeadPointer {
    pub fn new(commit_id: ContentHash, payload_id: Option<ContentHash>) -> Self {
        Self {
            commit_id,
            payload_id,
        }
    }

    /// Returns `true` if this head carries exactly the given payload.
    pub fn has_payload(&self, payload: &ContentHash) -> bool {
        self.payload_id.as_ref() == Some(payload)
    }
}

impl fmt::Debug for HeadPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload_id {
            Some(p) => write!(
                f,
                "HeadPointer({} -> {})",
                self.commit_id.short_hex(),
                p.short_hex()
            ),
            None => write!(f, "HeadPointer({})", self.commit_id.short_hex()),
        }
    }
}
