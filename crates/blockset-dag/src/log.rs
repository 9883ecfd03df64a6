use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use blockset_store::ObjectStore;
use blockset_types::ContentHash;
use tracing::debug;

use crate::commit::Commit;
use crate::error::{DagError, DagResult};
use crate::walk::Walk;

/// Nearest common ancestor of two heads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MergeBase {
    pub id: ContentHash,
    /// Edges from the first head to the base.
    pub distance_a: usize,
    /// Edges from the second head to the base.
    pub distance_b: usize,
}

/// Everything a head keeps alive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReachableSet {
    pub commits: HashSet<ContentHash>,
    pub payloads: HashSet<ContentHash>,
    /// Commits referenced in the history but absent from the local pool.
    pub missing: HashSet<ContentHash>,
}

impl ReachableSet {
    /// Every object id in the set that is present locally.
    pub fn objects(&self) -> impl Iterator<Item = &ContentHash> {
        self.commits.iter().chain(self.payloads.iter())
    }

    pub fn contains(&self, id: &ContentHash) -> bool {
        self.commits.contains(id) || self.payloads.contains(id)
    }

    pub fn extend(&mut self, other: ReachableSet) {
        self.commits.extend(other.commits);
        self.payloads.extend(other.payloads);
        self.missing.extend(other.missing);
    }
}

/// Append-only commit history over an object pool.
///
/// The log holds no state of its own: commits live in the pool and a
/// history is identified only by its head id.
#[derive(Clone)]
pub struct CommitLog {
    store: Arc<dyn ObjectStore>,
}

impl CommitLog {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Write a commit and return it. The stored bytes' hash is its id.
    pub async fn append(
        &self,
        parents: Vec<ContentHash>,
        payload: Option<ContentHash>,
    ) -> DagResult<Commit> {
        let bytes = Commit::encode(&parents, payload)?;
        let id = self.store.store(&bytes).await?;
        debug!(commit = %id.short_hex(), parents = parents.len(), "appended commit");
        Ok(Commit {
            id,
            parents,
            payload,
        })
    }

    pub async fn read(&self, id: &ContentHash) -> DagResult<Commit> {
        match self.store.retrieve(id).await? {
            Some(bytes) => Commit::decode(*id, &bytes),
            None => Err(DagError::NotFound(*id)),
        }
    }

    /// Returns `true` if commit `id` is present locally.
    pub async fn contains(&self, id: &ContentHash) -> DagResult<bool> {
        Ok(self.store.exists(id).await?)
    }

    /// Lazy first-parent cursor starting at `head`.
    pub fn walk(&self, head: ContentHash) -> Walk {
        Walk::new(self.clone(), head)
    }

    /// Every commit reachable from `head`, each exactly once.
    ///
    /// The first-parent chain comes first, head to root. Parents that were
    /// not followed (the second and later parents of merges) are then
    /// visited breadth-first in the order they were encountered.
    pub async fn ancestors(&self, head: &ContentHash) -> DagResult<Vec<Commit>> {
        let mut visited = HashSet::new();
        let mut result = Vec::new();
        let mut queue = VecDeque::new();

        let mut cursor = Some(*head);
        while let Some(id) = cursor.take() {
            if !visited.insert(id) {
                break;
            }
            let commit = self.read(&id).await?;
            queue.extend(commit.parents.iter().skip(1).copied());
            cursor = commit.first_parent().copied();
            result.push(commit);
        }

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let commit = self.read(&id).await?;
            queue.extend(commit.parents.iter().copied());
            result.push(commit);
        }

        Ok(result)
    }

    /// Returns `true` if `ancestor` is reachable from `descendant`.
    /// A commit is its own ancestor.
    pub async fn is_ancestor(
        &self,
        ancestor: &ContentHash,
        descendant: &ContentHash,
    ) -> DagResult<bool> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([*descendant]);
        while let Some(id) = queue.pop_front() {
            if id == *ancestor {
                return Ok(true);
            }
            if !visited.insert(id) {
                continue;
            }
            let commit = self.read(&id).await?;
            queue.extend(commit.parents);
        }
        Ok(false)
    }

    /// BFS edge distance from `head` to every commit in its history.
    async fn distances(&self, head: &ContentHash) -> DagResult<HashMap<ContentHash, usize>> {
        let mut dist = HashMap::new();
        let mut queue = VecDeque::from([(*head, 0usize)]);
        while let Some((id, d)) = queue.pop_front() {
            if dist.contains_key(&id) {
                continue;
            }
            dist.insert(id, d);
            let commit = self.read(&id).await?;
            for parent in commit.parents {
                queue.push_back((parent, d + 1));
            }
        }
        Ok(dist)
    }

    /// Nearest common ancestor of `a` and `b`.
    ///
    /// "Nearest" minimizes the summed BFS distance from both heads; ties go
    /// to the smaller commit id, so `merge_base(a, b)` and `merge_base(b, a)`
    /// agree on every device.
    pub async fn merge_base(
        &self,
        a: &ContentHash,
        b: &ContentHash,
    ) -> DagResult<Option<MergeBase>> {
        let from_a = self.distances(a).await?;
        let from_b = self.distances(b).await?;
        let base = from_a
            .iter()
            .filter_map(|(id, da)| from_b.get(id).map(|db| (*id, *da, *db)))
            .min_by(|x, y| (x.1 + x.2, x.0).cmp(&(y.1 + y.2, y.0)))
            .map(|(id, distance_a, distance_b)| MergeBase {
                id,
                distance_a,
                distance_b,
            });
        Ok(base)
    }

    /// Commits and payloads reachable from `head`.
    ///
    /// Commits missing from the pool are recorded in
    /// [`ReachableSet::missing`] instead of failing, so a partially synced
    /// history can still be marked.
    pub async fn reachable(&self, head: &ContentHash) -> DagResult<ReachableSet> {
        let mut set = ReachableSet::default();
        let mut queue = VecDeque::from([*head]);
        while let Some(id) = queue.pop_front() {
            if set.commits.contains(&id) || set.missing.contains(&id) {
                continue;
            }
            let commit = match self.read(&id).await {
                Ok(commit) => commit,
                Err(DagError::NotFound(_)) => {
                    set.missing.insert(id);
                    continue;
                }
                Err(e) => return Err(e),
            };
            set.commits.insert(id);
            if let Some(payload) = commit.payload {
                set.payloads.insert(payload);
            }
            queue.extend(commit.parents);
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockset_store::InMemoryObjectStore;

    fn log() -> CommitLog {
        CommitLog::new(Arc::new(InMemoryObjectStore::new()))
    }

    async fn payload(log: &CommitLog, text: &str) -> ContentHash {
        log.store().store(text.as_bytes()).await.unwrap()
    }

    #[tokio::test]
    async fn append_then_read() {
        let log = log();
        let p = payload(&log, "New task").await;
        let c1 = log.append(vec![], Some(p)).await.unwrap();
        let back = log.read(&c1.id).await.unwrap();
        assert_eq!(back, c1);
        assert!(back.is_root());
    }

    #[tokio::test]
    async fn identical_commits_share_an_id() {
        let log = log();
        let p = payload(&log, "x").await;
        let a = log.append(vec![], Some(p)).await.unwrap();
        let b = log.append(vec![], Some(p)).await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let log = log();
        let id = ContentHash::from_digest([9; 32]);
        assert!(matches!(log.read(&id).await, Err(DagError::NotFound(x)) if x == id));
    }

    #[tokio::test]
    async fn read_payload_blob_is_decode_error() {
        let log = log();
        let p = payload(&log, "not a commit").await;
        assert!(matches!(log.read(&p).await, Err(DagError::Decode { .. })));
    }

    #[tokio::test]
    async fn ancestors_order_first_parent_then_side_branches() {
        // root <- a <- b <- m
        //      \- s1 <- s2 -/
        let log = log();
        let root = log.append(vec![], None).await.unwrap();
        let a = log.append(vec![root.id], Some(payload(&log, "a").await)).await.unwrap();
        let b = log.append(vec![a.id], Some(payload(&log, "b").await)).await.unwrap();
        let s1 = log.append(vec![root.id], Some(payload(&log, "s1").await)).await.unwrap();
        let s2 = log.append(vec![s1.id], Some(payload(&log, "s2").await)).await.unwrap();
        let m = log.append(vec![b.id, s2.id], None).await.unwrap();

        let ids: Vec<_> = log.ancestors(&m.id).await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![m.id, b.id, a.id, root.id, s2.id, s1.id]);
    }

    #[tokio::test]
    async fn is_ancestor_checks() {
        let log = log();
        let a = log.append(vec![], Some(payload(&log, "a").await)).await.unwrap();
        let b = log.append(vec![a.id], Some(payload(&log, "b").await)).await.unwrap();
        assert!(log.is_ancestor(&a.id, &b.id).await.unwrap());
        assert!(!log.is_ancestor(&b.id, &a.id).await.unwrap());
        assert!(log.is_ancestor(&b.id, &b.id).await.unwrap());
    }

    #[tokio::test]
    async fn merge_base_of_divergent_heads() {
        let log = log();
        let base = log.append(vec![], Some(payload(&log, "base").await)).await.unwrap();
        let l1 = log.append(vec![base.id], Some(payload(&log, "l1").await)).await.unwrap();
        let l2 = log.append(vec![l1.id], Some(payload(&log, "l2").await)).await.unwrap();
        let r1 = log.append(vec![base.id], Some(payload(&log, "r1").await)).await.unwrap();

        let mb = log.merge_base(&l2.id, &r1.id).await.unwrap().unwrap();
        assert_eq!(mb, MergeBase { id: base.id, distance_a: 2, distance_b: 1 });

        let flipped = log.merge_base(&r1.id, &l2.id).await.unwrap().unwrap();
        assert_eq!(flipped.id, base.id);
        assert_eq!((flipped.distance_a, flipped.distance_b), (1, 2));
    }

    #[tokio::test]
    async fn unrelated_histories_have_no_merge_base() {
        let log = log();
        let a = log.append(vec![], Some(payload(&log, "a").await)).await.unwrap();
        let b = log.append(vec![], Some(payload(&log, "b").await)).await.unwrap();
        assert!(log.merge_base(&a.id, &b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reachable_collects_commits_and_payloads() {
        let log = log();
        let p1 = payload(&log, "one").await;
        let p2 = payload(&log, "two").await;
        let c1 = log.append(vec![], Some(p1)).await.unwrap();
        let c2 = log.append(vec![c1.id], Some(p2)).await.unwrap();

        let set = log.reachable(&c2.id).await.unwrap();
        assert_eq!(set.commits, HashSet::from([c1.id, c2.id]));
        assert_eq!(set.payloads, HashSet::from([p1, p2]));
        assert!(set.missing.is_empty());
        assert_eq!(set.objects().count(), 4);
    }

    #[tokio::test]
    async fn reachable_tolerates_missing_history() {
        let log = log();
        let c1 = log.append(vec![], None).await.unwrap();
        let c2 = log.append(vec![c1.id], None).await.unwrap();
        log.store().delete(&c1.id).await.unwrap();

        let set = log.reachable(&c2.id).await.unwrap();
        assert_eq!(set.commits, HashSet::from([c2.id]));
        assert_eq!(set.missing, HashSet::from([c1.id]));
    }
}
