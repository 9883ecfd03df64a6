use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use blockset_crypto::ContentHasher;
use blockset_types::{ContentHash, HeadPointer, RecordId};
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use crate::types::{HeadRejection, HeadUpdate, RemoteHead};

/// A replica held entirely in memory.
///
/// Several local stores can sync through one shared `InMemoryRemote` to
/// model a set of devices.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    objects: RwLock<HashMap<ContentHash, Vec<u8>>>,
    heads: RwLock<BTreeMap<RecordId, RemoteHead>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(&self, record_id: &RecordId) -> Option<HeadPointer> {
        self.heads
            .read()
            .expect("lock poisoned")
            .get(record_id)
            .map(|r| r.head)
    }

    pub fn has_object(&self, id: &ContentHash) -> bool {
        self.objects.read().expect("lock poisoned").contains_key(id)
    }
}

#[async_trait]
impl SyncTransport for InMemoryRemote {
    async fn list_heads(&self) -> SyncResult<Vec<RemoteHead>> {
        Ok(self
            .heads
            .read()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect())
    }

    async fn fetch_objects(&self, ids: &[ContentHash]) -> SyncResult<Vec<Vec<u8>>> {
        let objects = self.objects.read().expect("lock poisoned");
        ids.iter()
            .map(|id| objects.get(id).cloned().ok_or(SyncError::MissingObject(*id)))
            .collect()
    }

    async fn push_objects(&self, objects: &[Vec<u8>]) -> SyncResult<()> {
        let mut map = self.objects.write().expect("lock poisoned");
        for bytes in objects {
            map.entry(ContentHasher::OBJECT.hash(bytes))
                .or_insert_with(|| bytes.clone());
        }
        Ok(())
    }

    async fn update_heads(&self, updates: &[HeadUpdate]) -> SyncResult<Vec<HeadRejection>> {
        let objects = self.objects.read().expect("lock poisoned");
        let mut heads = self.heads.write().expect("lock poisoned");
        let mut rejections = Vec::new();
        for update in updates {
            let current = heads.get(&update.record_id).map(|r| r.head);
            if current != update.old {
                rejections.push(HeadRejection {
                    record_id: update.record_id,
                    reason: "remote head moved".into(),
                });
                continue;
            }
            if !objects.contains_key(&update.new.commit_id) {
                rejections.push(HeadRejection {
                    record_id: update.record_id,
                    reason: format!("commit {} was not pushed", update.new.commit_id),
                });
                continue;
            }
            debug!(record = %update.record_id, head = ?update.new, "remote head updated");
            heads.insert(
                update.record_id,
                RemoteHead {
                    record_id: update.record_id,
                    kind: update.kind.clone(),
                    head: update.new,
                },
            );
        }
        Ok(rejections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_then_fetch() {
        let remote = InMemoryRemote::new();
        remote.push_objects(&[b"blob".to_vec()]).await.unwrap();
        let id = ContentHasher::OBJECT.hash(b"blob");
        assert!(remote.has_object(&id));
        assert_eq!(remote.fetch_objects(&[id]).await.unwrap(), vec![b"blob".to_vec()]);
    }

    #[tokio::test]
    async fn fetch_missing_fails() {
        let remote = InMemoryRemote::new();
        let id = ContentHash::from_digest([1; 32]);
        assert!(matches!(
            remote.fetch_objects(&[id]).await,
            Err(SyncError::MissingObject(x)) if x == id
        ));
    }

    #[tokio::test]
    async fn update_heads_is_compare_and_swap() {
        let remote = InMemoryRemote::new();
        remote.push_objects(&[b"c1".to_vec(), b"c2".to_vec()]).await.unwrap();
        let c1 = HeadPointer::new(ContentHasher::OBJECT.hash(b"c1"), None);
        let c2 = HeadPointer::new(ContentHasher::OBJECT.hash(b"c2"), None);
        let id = RecordId::new();

        let create = HeadUpdate { record_id: id, kind: "task".into(), old: None, new: c1 };
        assert!(remote.update_heads(&[create.clone()]).await.unwrap().is_empty());
        assert_eq!(remote.head(&id), Some(c1));

        // Stale expectation.
        let rejected = remote.update_heads(&[create]).await.unwrap();
        assert_eq!(rejected.len(), 1);

        let advance = HeadUpdate { record_id: id, kind: "task".into(), old: Some(c1), new: c2 };
        assert!(remote.update_heads(&[advance]).await.unwrap().is_empty());
        assert_eq!(remote.list_heads().await.unwrap()[0].head, c2);
    }

    #[tokio::test]
    async fn head_without_objects_is_rejected() {
        let remote = InMemoryRemote::new();
        let update = HeadUpdate {
            record_id: RecordId::new(),
            kind: "task".into(),
            old: None,
            new: HeadPointer::new(ContentHash::from_digest([5; 32]), None),
        };
        assert_eq!(remote.update_heads(&[update]).await.unwrap().len(), 1);
    }
}
