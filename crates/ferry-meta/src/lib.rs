//! Chunk location index backed by SQLite.
//!
//! [`MetaIndex`] records where chunk content has been observed on local disk,
//! one row per `(digest, cutpoint, size, file_path)` occurrence. It is a
//! **cache**: every row can be rebuilt by re-chunking the referenced files, and
//! rows whose files have disappeared are tolerated until the janitor prunes them.
//!
//! Rows are used for:
//! - scavenging: finding other local files that already hold a wanted chunk
//! - garbage collection: deciding which blobs no live file references

mod error;
mod index;

pub use error::MetaError;
pub use index::MetaIndex;
