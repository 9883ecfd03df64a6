//! Mutation cells and record handles.
//!
//! A [`MutationCell`] is the single authority over one record's head. Every
//! writer goes through [`MutationCell::lock`], so saves of one record are
//! applied one after another while saves of different records never wait on
//! each other. Readers take a cheap snapshot with
//! [`MutationCell::current_head`].
//!
//! A [`RecordHandle`] pairs a domain value with the cell of the record it
//! belongs to. The [`CellRegistry`] makes sure every live handle of a record
//! shares the same cell, however the handles were obtained.

pub mod cell;
pub mod error;
pub mod handle;
pub mod registry;

pub use cell::{CellState, CellWriteGuard, MutationCell};
pub use error::{CellError, CellResult};
pub use handle::{Record, RecordHandle};
pub use registry::CellRegistry;
