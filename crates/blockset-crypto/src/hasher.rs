use blockset_types::ContentHash;
use serde::Serialize;

use crate::canonical::to_canonical_vec;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation. Every object in the pool (payload blobs, attachments and
/// commits alike) is hashed under [`ContentHasher::OBJECT`], so that the pool
/// can re-verify any file without knowing what it holds.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for everything stored in the object pool.
    pub const OBJECT: Self = Self {
        domain: "blockset-object-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ContentHash::from_digest(*hasher.finalize().as_bytes())
    }

    /// Hash a serializable value through its canonical encoding.
    ///
    /// Fails if the value has no canonical encoding; there is no fallback
    /// identity.
    pub fn hash_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<ContentHash, HasherError> {
        let data = to_canonical_vec(value)?;
        Ok(self.hash(&data))
    }

    /// Verify that data produces the expected content hash.
    pub fn verify(&self, data: &[u8], expected: &ContentHash) -> bool {
        self.hash(data) == *expected
    }
}

/// Errors from hashing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("value has no canonical encoding: {0}")]
    Encoding(String),
}
