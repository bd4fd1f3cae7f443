//! Error types for the engine.

use std::path::PathBuf;

use ferry_types::Digest;

/// Errors that can occur during engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Failed to access the metadata index.
    #[error("metadata error: {0}")]
    Meta(#[from] ferry_meta::MetaError),

    /// Failed to access the chunk store.
    #[error("store error: {0}")]
    Store(#[from] ferry_store::StoreError),

    /// Hashing, chunking or manifest encoding error.
    #[error("cas error: {0}")]
    Cas(#[from] ferry_cas::CasError),

    /// Channel or framing error.
    #[error("channel error: {0}")]
    Net(#[from] ferry_net::NetError),

    /// Filesystem error outside the store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid node configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A buffer sized from a manifest or index value could not be allocated.
    #[error("failed to allocate a {0}-byte buffer")]
    Allocation(usize),

    /// Bytes did not hash to the digest they were supposed to have.
    #[error("corruption in {context}: expected {expected}, actual hash {actual}")]
    Corruption {
        /// What was being verified.
        context: String,
        expected: Digest,
        actual: Digest,
    },

    /// The peer sent something the protocol does not allow.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Index paths are stored as UTF-8 text.
    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),
}
