//! Merge policies for divergent record histories.
//!
//! When the same record was edited on two devices, sync creates a merge
//! commit whose payload is chosen by a [`MergePolicy`]. Policies work on
//! decoded JSON payloads so they stay independent of the record type.
//!
//! - [`FieldMerge`] -- three-way merge over top-level fields (default)
//! - [`PreferLocal`] / [`PreferRemote`] -- keep one side wholesale

pub mod error;
pub mod policy;

pub use error::MergeError;
pub use policy::{FieldMerge, MergeInput, MergePolicy, MergeSide, PreferLocal, PreferRemote};
