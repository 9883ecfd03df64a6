use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::SystemTime;

use async_trait::async_trait;
use blockset_crypto::ContentHasher;
use blockset_types::ContentHash;

use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectMeta, ObjectStore};

struct MemObject {
    data: Vec<u8>,
    modified: SystemTime,
}

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. Reads always verify, since re-hashing
/// an in-memory buffer costs nothing next to the copy.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ContentHash, MemObject>>,
    quarantine: RwLock<HashMap<ContentHash, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            quarantine: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn store(&self, data: &[u8]) -> StoreResult<ContentHash> {
        let id = ContentHasher::OBJECT.hash(data);
        let mut map = self.objects.write().expect("lock poisoned");
        let now = SystemTime::now();
        map.entry(id)
            .and_modify(|obj| obj.modified = now)
            .or_insert_with(|| MemObject {
                data: data.to_vec(),
                modified: now,
            });
        Ok(id)
    }

    async fn retrieve(&self, id: &ContentHash) -> StoreResult<Option<Vec<u8>>> {
        let data = {
            let map = self.objects.read().expect("lock poisoned");
            match map.get(id) {
                Some(obj) => obj.data.clone(),
                None => return Ok(None),
            }
        };
        let computed = ContentHasher::OBJECT.hash(&data);
        if computed != *id {
            self.quarantine(id).await?;
            return Err(StoreError::CorruptObject { id: *id, computed });
        }
        Ok(Some(data))
    }

    async fn exists(&self, id: &ContentHash) -> StoreResult<bool> {
        Ok(self.objects.read().expect("lock poisoned").contains_key(id))
    }

    async fn delete(&self, id: &ContentHash) -> StoreResult<bool> {
        Ok(self.objects.write().expect("lock poisoned").remove(id).is_some())
    }

    async fn meta(&self, id: &ContentHash) -> StoreResult<Option<ObjectMeta>> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.get(id).map(|obj| ObjectMeta {
            id: *id,
            size: obj.data.len() as u64,
            modified: obj.modified,
        }))
    }

    async fn list(&self) -> StoreResult<Vec<ObjectMeta>> {
        let map = self.objects.read().expect("lock poisoned");
        let mut out: Vec<ObjectMeta> = map
            .iter()
            .map(|(id, obj)| ObjectMeta {
                id: *id,
                size: obj.data.len() as u64,
                modified: obj.modified,
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn quarantine(&self, id: &ContentHash) -> StoreResult<bool> {
        let removed = self.objects.write().expect("lock poisoned").remove(id);
        match removed {
            Some(obj) => {
                self.quarantine
                    .write()
                    .expect("lock poisoned")
                    .insert(*id, obj.data);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn quarantined(&self) -> StoreResult<Vec<ContentHash>> {
        let mut ids: Vec<ContentHash> = self
            .quarantine
            .read()
            .expect("lock poisoned")
            .keys()
            .copied()
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn path_of(&self, _id: &ContentHash) -> Option<PathBuf> {
        None
    }
}
