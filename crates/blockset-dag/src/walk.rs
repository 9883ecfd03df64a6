use blockset_types::ContentHash;

use crate::commit::Commit;
use crate::error::DagResult;
use crate::log::CommitLog;

/// First-parent cursor over a record's history.
///
/// Yields the head first and each commit's first parent after it, ending
/// once a root has been yielded. Commits are read one at a time, so a walk
/// that is abandoned early never touches older history.
pub struct Walk {
    log: CommitLog,
    head: ContentHash,
    next: Option<ContentHash>,
}

impl Walk {
    pub(crate) fn new(log: CommitLog, head: ContentHash) -> Self {
        Self {
            log,
            head,
            next: Some(head),
        }
    }

    pub fn head(&self) -> &ContentHash {
        &self.head
    }

    /// The next commit, or `None` once the root has been passed.
    pub async fn next(&mut self) -> DagResult<Option<Commit>> {
        let Some(id) = self.next.take() else {
            return Ok(None);
        };
        let commit = self.log.read(&id).await?;
        self.next = commit.first_parent().copied();
        Ok(Some(commit))
    }

    /// Start over from the head.
    pub fn restart(&mut self) {
        self.next = Some(self.head);
    }

    /// Drain the remaining commits.
    pub async fn collect(&mut self) -> DagResult<Vec<Commit>> {
        let mut out = Vec::new();
        while let Some(commit) = self.next().await? {
            out.push(commit);
        }
        Ok(out)
    }
}
