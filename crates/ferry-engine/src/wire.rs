//! Manifest framing on top of the channel primitives.

use ferry_cas::{MAX_MANIFEST_SIZE, deserialize_manifest, serialize_manifest, validate_manifest};
use ferry_net::{Transport, read_frame, write_frame};
use ferry_types::Manifest;
use tracing::debug;

use crate::error::EngineError;

/// Serialize and send a manifest as one length-prefixed frame.
pub(crate) fn send_manifest<T: Transport + ?Sized>(
    channel: &mut T,
    manifest: &Manifest,
) -> Result<(), EngineError> {
    let payload = serialize_manifest(manifest)?;
    if payload.is_empty() || payload.len() > MAX_MANIFEST_SIZE {
        return Err(EngineError::Protocol(format!(
            "refusing to send a {}-byte manifest (limit {MAX_MANIFEST_SIZE})",
            payload.len()
        )));
    }
    write_frame(channel, &payload)?;
    debug!(
        file_name = %manifest.file_name,
        chunks = manifest.chunk_count(),
        bytes = payload.len(),
        "sent manifest"
    );
    Ok(())
}

/// Receive, decode and structurally validate a manifest.
pub(crate) fn recv_manifest<T: Transport + ?Sized>(channel: &mut T) -> Result<Manifest, EngineError> {
    let payload = read_frame(channel)?;
    let manifest = deserialize_manifest(&payload)?;
    validate_manifest(&manifest)?;
    debug!(
        file_name = %manifest.file_name,
        file_size = manifest.file_size,
        chunks = manifest.chunk_count(),
        source_id = manifest.source_id,
        "received manifest"
    );
    Ok(manifest)
}
