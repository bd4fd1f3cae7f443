//! Core trait and types for chunk storage.

use ferry_types::Digest;

use crate::error::StoreError;

/// Outcome of re-hashing a stored blob against its digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobStatus {
    /// The blob exists and hashes to its digest.
    Valid,
    /// No blob is stored under the digest.
    Missing,
    /// The blob exists but its bytes hash to `actual`.
    Corrupt { actual: Digest },
}

/// Trait for storing and retrieving chunk blobs by digest.
///
/// All implementations must be `Send + Sync` so fetch workers can share one
/// store across threads.
pub trait ChunkStore: Send + Sync {
    /// Store a chunk. The data must hash to `digest`.
    ///
    /// Replacing an existing blob is allowed; readers never observe a
    /// partially written blob.
    fn put(&self, digest: Digest, data: &[u8]) -> Result<(), StoreError>;

    /// Retrieve a chunk, verifying it on read. Returns `None` if absent.
    fn get(&self, digest: Digest) -> Result<Option<Vec<u8>>, StoreError>;

    /// Re-hash the stored blob and report whether it is present and intact.
    fn check(&self, digest: Digest) -> Result<BlobStatus, StoreError>;

    /// Delete a chunk. Returns `false` if nothing was stored.
    fn delete(&self, digest: Digest) -> Result<bool, StoreError>;

    /// Check whether a blob exists, without verifying it.
    fn contains(&self, digest: Digest) -> Result<bool, StoreError>;

    /// List all stored digests.
    fn list(&self) -> Result<Vec<Digest>, StoreError>;
}
