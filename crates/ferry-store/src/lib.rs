//! Chunk blob storage.
//!
//! This crate defines the [`ChunkStore`] trait for persisting chunk bytes keyed
//! by their [`Digest`](ferry_types::Digest), along with two backends:
//!
//! - [`FileChunkStore`]: one file per chunk in a flat directory, named by the
//!   16-hex-digit digest.
//! - [`MemoryChunkStore`]: in-memory storage backed by a `RwLock<HashMap>`.
//!
//! Every backend verifies content against the digest on read, so a blob that
//! was altered behind the store's back is reported rather than returned.

mod error;
mod file_store;
mod memory_store;
mod traits;

pub use error::StoreError;
pub use file_store::FileChunkStore;
pub use memory_store::MemoryChunkStore;
pub use traits::{BlobStatus, ChunkStore};
