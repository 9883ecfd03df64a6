//! Commit history for BlockSet records.
//!
//! Every save of a record appends an immutable [`Commit`] naming its parent
//! commits and the payload snapshot it points at. Commits are canonical JSON
//! objects stored in the same content-addressed pool as payloads and
//! attachments, so a commit's id is the hash of its encoding and history can
//! never be rewritten in place.
//!
//! [`CommitLog`] appends and reads commits and answers the traversal queries
//! used by fetch, sync and garbage collection: first-parent [`Walk`]s, full
//! ancestor listings, ancestry checks, merge bases and reachable sets.
//!
//! # Invariants
//!
//! - The graph is acyclic: a commit's id depends on its parents' ids.
//! - Zero-parent commits are roots. A merge commit lists `[local, remote]`.

pub mod commit;
pub mod error;
pub mod log;
pub mod walk;

pub use commit::Commit;
pub use error::{DagError, DagResult};
pub use log::{CommitLog, MergeBase, ReachableSet};
pub use walk::Walk;
