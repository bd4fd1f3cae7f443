//! In-memory chunk storage backend.

use std::collections::HashMap;
use ferry_types::Digest;
use parking_lot::RwLock;
use tracing::{debug, error};

use crate::error::StoreError;
use crate::traits::{BlobStatus, ChunkStore};

/// In-memory chunk store backed by a `RwLock<HashMap>`.
///
/// Useful for tests and for nodes that never need their cache to outlive the
/// process.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    chunks: RwLock<HashMap<Digest, Vec<u8>>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a stored blob without any digest check.
    ///
    /// Simulates on-disk tampering in tests.
    pub fn overwrite_unchecked(&self, digest: Digest, data: &[u8]) {
        let mut map = self.chunks.write();
        map.insert(digest, data.to_vec());
    }
}

impl ChunkStore for MemoryChunkStore {
    fn put(&self, digest: Digest, data: &[u8]) -> Result<(), StoreError> {
        let actual = Digest::from_data(data);
        if actual != digest {
            return Err(StoreError::DigestMismatch {
                expected: digest,
                actual,
            });
        }
        let mut map = self.chunks.write();
        debug!(%digest, size = data.len(), "storing chunk in memory");
        map.insert(digest, data.to_vec());
        Ok(())
    }

    fn get(&self, digest: Digest) -> Result<Option<Vec<u8>>, StoreError> {
        let map = self.chunks.read();
        match map.get(&digest) {
            Some(data) => {
                let actual = Digest::from_data(data);
                if actual != digest {
                    error!(expected = %digest, %actual, "chunk corruption detected on read");
                    return Err(StoreError::Corrupt {
                        expected: digest,
                        actual,
                    });
                }
                Ok(Some(data.clone()))
            }
            None => Ok(None),
        }
    }

    fn check(&self, digest: Digest) -> Result<BlobStatus, StoreError> {
        let map = self.chunks.read();
        Ok(match map.get(&digest) {
            None => BlobStatus::Missing,
            Some(data) => {
                let actual = Digest::from_data(data);
                if actual == digest {
                    BlobStatus::Valid
                } else {
                    BlobStatus::Corrupt { actual }
                }
            }
        })
    }

    fn delete(&self, digest: Digest) -> Result<bool, StoreError> {
        let mut map = self.chunks.write();
        let removed = map.remove(&digest).is_some();
        if removed {
            debug!(%digest, "deleted chunk from memory");
        }
        Ok(removed)
    }

    fn contains(&self, digest: Digest) -> Result<bool, StoreError> {
        let map = self.chunks.read();
        Ok(map.contains_key(&digest))
    }

    fn list(&self) -> Result<Vec<Digest>, StoreError> {
        let map = self.chunks.read();
        Ok(map.keys().copied().collect())
    }
}
