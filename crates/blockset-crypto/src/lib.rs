//! Hashing service for BlockSet.
//!
//! Provides the canonical JSON encoding used for every structured object
//! (record payloads and commits) and the domain-separated BLAKE3 hasher that
//! turns canonical bytes into a [`ContentHash`](blockset_types::ContentHash),
//! plus the scan that finds hashes embedded in payloads.
//!
//! All crypto operations wrap established libraries. There is no custom cryptography.

pub mod canonical;
pub mod hasher;
pub mod refs;

pub use canonical::{to_canonical_value, to_canonical_vec};
pub use hasher::{ContentHasher, HasherError};
pub use refs::{embedded_hashes, embedded_hashes_in};
