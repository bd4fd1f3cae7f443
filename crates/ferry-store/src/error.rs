//! Error types for chunk storage operations.

use ferry_types::Digest;

/// Errors that can occur during chunk storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Blob bytes on disk do not hash to the digest they are stored under.
    #[error("chunk corruption detected: expected {expected}, actual hash {actual}")]
    Corrupt {
        /// The digest that was requested.
        expected: Digest,
        /// The digest computed from the bytes actually stored.
        actual: Digest,
    },

    /// Data handed to `put` does not hash to the given digest.
    #[error("refusing to store chunk under {expected}: data hashes to {actual}")]
    DigestMismatch { expected: Digest, actual: Digest },
}

impl From<ferry_cas::CasError> for StoreError {
    fn from(err: ferry_cas::CasError) -> Self {
        match err {
            ferry_cas::CasError::Io(e) => StoreError::Io(e),
            ferry_cas::CasError::Open { source, .. } => StoreError::Io(source),
            other => StoreError::Io(std::io::Error::other(other)),
        }
    }
}
