//! Error types for content addressing operations.

use std::path::PathBuf;

/// Errors that can occur during hashing, chunking, or manifest encoding.
#[derive(Debug, thiserror::Error)]
pub enum CasError {
    /// An I/O error occurred while reading a file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The file to chunk could not be opened.
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Zero-length files have no chunks and cannot be transferred.
    #[error("file is empty: {}", .0.display())]
    EmptyFile(PathBuf),

    /// The file changed length while it was being chunked.
    #[error("{} changed size while chunking: expected {expected} bytes, read {actual}", path.display())]
    SizeChanged {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// Chunk and I/O block sizes must both be nonzero.
    #[error("invalid chunker sizes: chunk_size={chunk_size}, io_block_size={io_block_size}")]
    InvalidSizes { chunk_size: u64, io_block_size: usize },

    /// A buffer could not be allocated.
    #[error("failed to allocate a {0}-byte buffer")]
    Allocation(usize),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A decoded manifest violates a structural invariant.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}
