use std::fmt;
use std::sync::Arc;

use blockset_types::{HeadPointer, RecordId};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cell::MutationCell;

/// A domain type that can be persisted.
///
/// `KIND` partitions the manifest: `fetch_all::<T>()` returns every record
/// saved under `T::KIND`. It must be a valid kind name (see
/// `blockset_manifest::validate_kind`) and must never change once data has
/// been written.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: &'static str;
}

/// A record's value together with the cell that owns its head.
///
/// Editing the value is local until the handle is saved. Clones share the
/// cell; two handles are the same record exactly when they share a cell.
pub struct RecordHandle<T> {
    id: RecordId,
    value: T,
    cell: Arc<MutationCell>,
}

impl<T> RecordHandle<T> {
    /// A brand new record that has never been saved.
    pub fn initial(value: T) -> Self {
        Self {
            id: RecordId::new(),
            value,
            cell: Arc::new(MutationCell::new()),
        }
    }

    pub fn from_parts(id: RecordId, value: T, cell: Arc<MutationCell>) -> Self {
        Self { id, value, cell }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub fn set_value(&mut self, value: T) {
        self.value = value;
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn cell(&self) -> &Arc<MutationCell> {
        &self.cell
    }

    pub fn current_head(&self) -> Option<HeadPointer> {
        self.cell.current_head()
    }

    /// Returns `true` once the record has been saved at least once.
    pub fn is_persisted(&self) -> bool {
        self.current_head().is_some()
    }
}

impl<T: Clone> Clone for RecordHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: self.value.clone(),
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> PartialEq for RecordHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cell.id() == other.cell.id()
    }
}

impl<T> Eq for RecordHandle<T> {}

impl<T: fmt::Debug> fmt::Debug for RecordHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordHandle")
            .field("id", &self.id)
            .field("cell", &self.cell.id())
            .field("head", &self.current_head())
            .field("value", &self.value)
            .finish()
    }
}
