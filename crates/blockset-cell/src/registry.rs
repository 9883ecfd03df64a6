use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use blockset_types::RecordId;

use crate::cell::MutationCell;

/// Live cells by record.
///
/// Entries are weak: a record's cell lives exactly as long as some handle
/// holds it. The map lock is only held for the lookup itself.
#[derive(Debug, Default)]
pub struct CellRegistry {
    cells: Mutex<HashMap<RecordId, Weak<MutationCell>>>,
}

impl CellRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn cells(&self) -> std::sync::MutexGuard<'_, HashMap<RecordId, Weak<MutationCell>>> {
        self.cells.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The live cell of `record_id`, if any handle still holds it.
    pub fn get(&self, record_id: &RecordId) -> Option<Arc<MutationCell>> {
        self.cells().get(record_id).and_then(Weak::upgrade)
    }

    /// The live cell of `record_id`, or a new one built by `make`.
    pub fn get_or_insert_with(
        &self,
        record_id: RecordId,
        make: impl FnOnce() -> MutationCell,
    ) -> Arc<MutationCell> {
        let mut cells = self.cells();
        if let Some(cell) = cells.get(&record_id).and_then(Weak::upgrade) {
            return cell;
        }
        let cell = Arc::new(make());
        cells.insert(record_id, Arc::downgrade(&cell));
        cell
    }

    /// Make `cell` the shared cell of `record_id` unless another live cell
    /// already is.
    pub fn register(&self, record_id: RecordId, cell: &Arc<MutationCell>) {
        let mut cells = self.cells();
        let live = cells.get(&record_id).and_then(Weak::upgrade);
        if live.is_none() {
            cells.insert(record_id, Arc::downgrade(cell));
        }
    }

    pub fn remove(&self, record_id: &RecordId) {
        self.cells().remove(record_id);
    }

    /// Drop entries whose cell is gone. Returns the number removed.
    pub fn prune(&self) -> usize {
        let mut cells = self.cells();
        let before = cells.len();
        cells.retain(|_, weak| weak.strong_count() > 0);
        before - cells.len()
    }
}
