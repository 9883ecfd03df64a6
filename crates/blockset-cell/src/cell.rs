use std::sync::RwLock;

use blockset_types::{CellId, HeadPointer};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::{CellError, CellResult};

/// Lifecycle of a cell's head.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellState {
    /// The record has never been saved.
    Uninitialized,
    Pointing(HeadPointer),
    /// The record was deleted. Terminal.
    Retired,
}

impl CellState {
    pub fn head(&self) -> Option<HeadPointer> {
        match self {
            Self::Pointing(head) => Some(*head),
            _ => None,
        }
    }
}

/// Owner of one record's head.
///
/// Writers are serialized by an async mutex held for the whole
/// read-compute-advance sequence of a save. The head itself sits behind a
/// separate short-lived lock, so readers never wait for a save in progress
/// and never observe a half-written pointer.
pub struct MutationCell {
    id: CellId,
    writer: Mutex<()>,
    state: RwLock<CellState>,
}

impl MutationCell {
    /// A cell for a record that has not been saved yet.
    pub fn new() -> Self {
        Self::with_state(CellState::Uninitialized)
    }

    /// A cell seeded from a persisted head.
    pub fn with_head(head: HeadPointer) -> Self {
        Self::with_state(CellState::Pointing(head))
    }

    fn with_state(state: CellState) -> Self {
        Self {
            id: CellId::new(),
            writer: Mutex::new(()),
            state: RwLock::new(state),
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn state(&self) -> CellState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current_head(&self) -> Option<HeadPointer> {
        self.state().head()
    }

    pub fn is_retired(&self) -> bool {
        self.state() == CellState::Retired
    }

    /// Wait for exclusive write access.
    pub async fn lock(&self) -> CellWriteGuard<'_> {
        let permit = self.writer.lock().await;
        CellWriteGuard {
            cell: self,
            _permit: permit,
        }
    }

    fn set_state(&self, state: CellState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

impl Default for MutationCell {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MutationCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationCell")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Exclusive write access to a [`MutationCell`].
///
/// Other writers wait until the guard is dropped. Dropping the guard without
/// calling [`advance`](Self::advance) leaves the head untouched.
pub struct CellWriteGuard<'a> {
    cell: &'a MutationCell,
    _permit: MutexGuard<'a, ()>,
}

impl CellWriteGuard<'_> {
    pub fn state(&self) -> CellState {
        self.cell.state()
    }

    pub fn head(&self) -> Option<HeadPointer> {
        self.cell.current_head()
    }

    /// Fails if the cell is retired.
    pub fn ensure_live(&self) -> CellResult<()> {
        if self.cell.is_retired() {
            return Err(CellError::Retired(self.cell.id));
        }
        Ok(())
    }

    /// Move the head.
    pub fn advance(&mut self, head: HeadPointer) -> CellResult<()> {
        self.ensure_live()?;
        self.cell.set_state(CellState::Pointing(head));
        debug!(cell = %self.cell.id, ?head, "advanced head");
        Ok(())
    }

    /// Retire the cell, returning the head it held.
    pub fn retire(&mut self) -> Option<HeadPointer> {
        let last = self.cell.current_head();
        self.cell.set_state(CellState::Retired);
        debug!(cell = %self.cell.id, "retired");
        last
    }
}
