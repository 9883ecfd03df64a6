/// Errors a merge policy can report.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MergeError {
    /// The policy cannot reconcile the two payloads.
    #[error("cannot merge: {0}")]
    Irreconcilable(String),
}
