//! Foundation types for BlockSet.
//!
//! This crate provides the identity and pointer types shared by every other
//! BlockSet crate.
//!
//! # Key Types
//!
//! - [`ContentHash`]: Content-addressed identifier (domain-separated BLAKE3)
//! - [`RecordId`]: Stable UUID v7 identifier of a logical record
//! - [`CellId`]: Identity of a mutation cell, used for handle equality
//! - [`HeadPointer`]: Current commit/payload position of a record

pub mod error;
pub mod hash;
pub mod head;
pub mod id;

pub use error::TypeError;
pub use hash::ContentHash;
pub use head::HeadPointer;
pub use id::{CellId, RecordId};
