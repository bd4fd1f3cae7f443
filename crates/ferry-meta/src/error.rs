//! Error types for the metadata index.

/// Errors returned by [`MetaIndex`](crate::MetaIndex) operations.
#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    /// SQLite error. Any failure inside a batch rolls the batch back.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A value does not fit SQLite's signed 64-bit integer column.
    #[error("{field} value {value} does not fit the index schema")]
    OutOfRange { field: &'static str, value: u64 },
}
