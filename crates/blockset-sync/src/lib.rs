//! Multi-device synchronization for BlockSet.
//!
//! Devices exchange record heads and the immutable objects behind them.
//! Because every object is content-addressed, transfers are verified by
//! re-hashing on receipt and never need conflict handling; only heads can
//! diverge, and those are reconciled by commit-DAG ancestry (fast-forward)
//! or by a merge commit.
//!
//! This crate defines the [`SyncTransport`] interface, the report types and
//! the object negotiation used by the sync engine in `blockset-sdk`. No
//! network protocol is provided; [`InMemoryRemote`] serves tests and
//! embedding.

pub mod error;
pub mod memory;
pub mod negotiation;
pub mod transport;
pub mod types;

pub use error::{SyncError, SyncResult};
pub use memory::InMemoryRemote;
pub use negotiation::{object_refs, FetchFrontier, NegotiationEngine, ObjectRefs};
pub use transport::SyncTransport;
pub use types::{HeadRejection, HeadUpdate, PullOutcome, RecordSync, RemoteHead, SyncReport};
