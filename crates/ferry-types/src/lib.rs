//! Shared types for ferry.
//!
//! This crate defines the core types used across the ferry workspace:
//! the content fingerprint ([`Digest`]), one observed chunk occurrence
//! ([`ChunkMeta`]), the per-file chunk layout ([`Manifest`]), and the
//! persisted chunk location ([`IndexRecord`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Digest
// ---------------------------------------------------------------------------

/// 64-bit content fingerprint of a byte range: `xxh3_64(data)`.
///
/// Rendered as exactly 16 lowercase hex digits, both on the wire and as the
/// blob file name in the chunk store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Digest(u64);

impl Digest {
    /// Fingerprint an in-memory buffer.
    pub fn from_data(data: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_64(data))
    }

    /// Return the raw 64-bit value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Digest {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

/// Error returned when a string is not a 16-digit hex digest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid digest {input:?}: expected 16 hex digits")]
pub struct ParseDigestError {
    input: String,
}

impl FromStr for Digest {
    type Err = ParseDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseDigestError {
            input: s.to_string(),
        };
        if s.len() != 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        u64::from_str_radix(s, 16).map(Self).map_err(|_| invalid())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Chunks and manifests
// ---------------------------------------------------------------------------

/// One observed occurrence of a chunk within a file.
///
/// Identity for dedup purposes is the digest alone; cutpoint and size describe
/// where this particular copy of the content lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Fingerprint of the chunk bytes.
    #[serde(rename = "chunk_checksum")]
    pub digest: Digest,
    /// Byte offset of the chunk within its file.
    pub cutpoint: u64,
    /// Number of bytes in the chunk.
    #[serde(rename = "chunk_size")]
    pub size: u64,
}

impl ChunkMeta {
    /// Byte offset one past the end of this chunk.
    pub fn end(&self) -> u64 {
        self.cutpoint + self.size
    }
}

/// Ordered chunk layout plus whole-file metadata for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Name of the file as given by the sender (may contain directories).
    pub file_name: String,
    /// Total size of the file in bytes.
    pub file_size: u64,
    /// Fingerprint of the whole file, independent of chunk boundaries.
    pub file_digest: Digest,
    /// Identity of the node that produced the manifest.
    pub source_id: u64,
    /// Chunks in file order.
    pub chunks: Vec<ChunkMeta>,
}

impl Manifest {
    /// Number of chunks in the sequence.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Size every chunk but the last one was cut to.
    pub fn nominal_chunk_size(&self) -> u64 {
        self.chunks.first().map_or(0, |c| c.size)
    }

    /// Look up the chunk at a sequence index.
    pub fn chunk(&self, index: u64) -> Option<&ChunkMeta> {
        usize::try_from(index).ok().and_then(|i| self.chunks.get(i))
    }
}

/// A persisted chunk location: `digest` was observed at `cutpoint` in `file_path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexRecord {
    pub digest: Digest,
    pub cutpoint: u64,
    pub size: u64,
    pub file_path: String,
}
