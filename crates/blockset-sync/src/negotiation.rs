use std::collections::{HashSet, VecDeque};

use blockset_crypto::embedded_hashes_in;
use blockset_dag::Commit;
use blockset_types::ContentHash;

/// References held by one object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectRefs {
    /// Parents and payload of a commit. The history is broken without them.
    pub required: Vec<ContentHash>,
    /// Hash-like strings embedded in a JSON payload. They usually name
    /// attachments but may be ordinary text, so a remote lacking one is not
    /// an error.
    pub embedded: Vec<ContentHash>,
}

/// What an object refers to: a commit's parents and payload, or the hashes
/// embedded in a JSON payload. Opaque blobs refer to nothing.
pub fn object_refs(id: ContentHash, bytes: &[u8]) -> ObjectRefs {
    if let Ok(commit) = Commit::decode(id, bytes) {
        let mut required = commit.parents;
        required.extend(commit.payload);
        return ObjectRefs {
            required,
            embedded: Vec::new(),
        };
    }
    ObjectRefs {
        required: Vec::new(),
        embedded: embedded_hashes_in(bytes).into_iter().collect(),
    }
}

/// Breadth-first queue of objects to request from a remote.
///
/// Each id is handed out at most once. The caller filters out ids already
/// present locally, fetches the rest and feeds their references back with
/// [`discover`](Self::discover). Embedded references wait in a separate
/// queue because the remote may legitimately lack them.
#[derive(Debug, Default)]
pub struct FetchFrontier {
    pending: VecDeque<ContentHash>,
    optional: VecDeque<ContentHash>,
    seen: HashSet<ContentHash>,
}

impl FetchFrontier {
    pub fn new(roots: impl IntoIterator<Item = ContentHash>) -> Self {
        let mut frontier = Self::default();
        frontier.discover_required(roots);
        frontier
    }

    /// Queue ids that must be fetched.
    pub fn discover_required(&mut self, ids: impl IntoIterator<Item = ContentHash>) {
        for id in ids {
            if self.seen.insert(id) {
                self.pending.push_back(id);
            }
        }
    }

    /// Queue everything `refs` names.
    pub fn discover(&mut self, refs: ObjectRefs) {
        self.discover_required(refs.required);
        for id in refs.embedded {
            if self.seen.insert(id) {
                self.optional.push_back(id);
            }
        }
    }

    /// Up to `max` required ids, oldest first.
    pub fn next_batch(&mut self, max: usize) -> Vec<ContentHash> {
        let n = max.min(self.pending.len());
        self.pending.drain(..n).collect()
    }

    /// Next embedded id, once every required id has been handed out.
    pub fn next_optional(&mut self) -> Option<ContentHash> {
        if self.pending.is_empty() {
            self.optional.pop_front()
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.optional.is_empty()
    }
}

/// Object set comparisons between a local store and a remote.
pub struct NegotiationEngine;

impl NegotiationEngine {
    /// Objects reachable locally that the remote does not already reach,
    /// in a stable order.
    pub fn objects_to_push(
        local: &HashSet<ContentHash>,
        remote: &HashSet<ContentHash>,
    ) -> Vec<ContentHash> {
        let mut out: Vec<ContentHash> = local.difference(remote).copied().collect();
        out.sort();
        out
    }
}
