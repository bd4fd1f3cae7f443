//! JSON wire form of a [`Manifest`].
//!
//! ```text
//! {"file_name":"a.bin","file_checksum":"<16 hex>","file_size":N,
//!  "source_id":N,"chunk_seq_len":N,
//!  "chunk_seq":[{"chunk_checksum":"<16 hex>","cutpoint":N,"chunk_size":N}, ...]}
//! ```
//!
//! `chunk_seq_len` is redundant with the array length; a mismatch on decode is
//! rejected. Manifests arriving from a peer should also pass
//! [`validate_manifest`] before anything acts on them.

use ferry_types::{ChunkMeta, Digest, Manifest};
use serde::{Deserialize, Serialize};

use crate::error::CasError;

/// Upper bound on an encoded manifest, in bytes.
pub const MAX_MANIFEST_SIZE: usize = 64 * 1024 * 1024;

#[derive(Serialize)]
struct WireManifestRef<'a> {
    file_name: &'a str,
    file_checksum: Digest,
    file_size: u64,
    source_id: u64,
    chunk_seq_len: u64,
    chunk_seq: &'a [ChunkMeta],
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireManifest {
    file_name: String,
    file_checksum: Digest,
    file_size: u64,
    source_id: u64,
    chunk_seq_len: u64,
    chunk_seq: Vec<ChunkMeta>,
}

/// Encode a manifest as JSON bytes.
pub fn serialize_manifest(manifest: &Manifest) -> Result<Vec<u8>, CasError> {
    let wire = WireManifestRef {
        file_name: &manifest.file_name,
        file_checksum: manifest.file_digest,
        file_size: manifest.file_size,
        source_id: manifest.source_id,
        chunk_seq_len: manifest.chunks.len() as u64,
        chunk_seq: &manifest.chunks,
    };
    serde_json::to_vec(&wire).map_err(|e| CasError::Serialization(e.to_string()))
}

/// Decode a manifest from JSON bytes.
pub fn deserialize_manifest(bytes: &[u8]) -> Result<Manifest, CasError> {
    let wire: WireManifest =
        serde_json::from_slice(bytes).map_err(|e| CasError::Serialization(e.to_string()))?;

    if wire.chunk_seq_len != wire.chunk_seq.len() as u64 {
        return Err(CasError::InvalidManifest(format!(
            "chunk_seq_len is {} but chunk_seq holds {} entries",
            wire.chunk_seq_len,
            wire.chunk_seq.len()
        )));
    }

    Ok(Manifest {
        file_name: wire.file_name,
        file_size: wire.file_size,
        file_digest: wire.file_checksum,
        source_id: wire.source_id,
        chunks: wire.chunk_seq,
    })
}

/// Check the layout invariants of a fixed-size chunk sequence.
///
/// The sequence must be non-empty, start at offset 0 and be contiguous, every
/// chunk but the last must have the same nonzero size, the last must be no
/// larger, and the sizes must add up to `file_size`.
pub fn validate_manifest(manifest: &Manifest) -> Result<(), CasError> {
    let invalid = |msg: String| Err(CasError::InvalidManifest(msg));

    let Some(last_index) = manifest.chunks.len().checked_sub(1) else {
        return invalid("empty chunk sequence".into());
    };
    let nominal = manifest.nominal_chunk_size();
    if nominal == 0 {
        return invalid("zero-sized chunk at index 0".into());
    }

    let mut expected_cutpoint = 0u64;
    for (i, chunk) in manifest.chunks.iter().enumerate() {
        if chunk.cutpoint != expected_cutpoint {
            return invalid(format!(
                "chunk {i} starts at {} but previous chunk ends at {expected_cutpoint}",
                chunk.cutpoint
            ));
        }
        let size_ok = if i == last_index {
            chunk.size > 0 && chunk.size <= nominal
        } else {
            chunk.size == nominal
        };
        if !size_ok {
            return invalid(format!(
                "chunk {i} has size {} (chunk size is {nominal})",
                chunk.size
            ));
        }
        let Some(end) = expected_cutpoint.checked_add(chunk.size) else {
            return invalid(format!("chunk {i} overflows the file offset range"));
        };
        expected_cutpoint = end;
    }

    if expected_cutpoint != manifest.file_size {
        return invalid(format!(
            "chunks cover {expected_cutpoint} bytes but file_size is {}",
            manifest.file_size
        ));
    }
    Ok(())
}
