use blockset_types::CellId;

/// Errors from mutation cell operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CellError {
    /// The cell's record was deleted; its head can no longer move.
    #[error("cell {0} is retired")]
    Retired(CellId),
}

pub type CellResult<T> = Result<T, CellError>;
