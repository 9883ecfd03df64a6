use async_trait::async_trait;
use blockset_types::ContentHash;

use crate::error::SyncResult;
use crate::types::{HeadRejection, HeadUpdate, RemoteHead};

/// Transport interface for a remote BlockSet replica.
///
/// Implementations must be cancel-safe at the granularity of a whole call:
/// the sync engine may drop any returned future.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Every live record head on the remote.
    async fn list_heads(&self) -> SyncResult<Vec<RemoteHead>>;

    /// Raw bytes of the requested objects, in request order.
    async fn fetch_objects(&self, ids: &[ContentHash]) -> SyncResult<Vec<Vec<u8>>>;

    /// Upload objects. The remote derives their ids itself.
    async fn push_objects(&self, objects: &[Vec<u8>]) -> SyncResult<()>;

    /// Compare-and-swap head updates. Each update applies only if the
    /// remote head still equals `old`; the rest are returned as rejections.
    async fn update_heads(&self, updates: &[HeadUpdate]) -> SyncResult<Vec<HeadRejection>>;
}
