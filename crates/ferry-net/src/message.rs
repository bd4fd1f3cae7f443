//! Chunk request message.

use ferry_types::Digest;
use serde::{Deserialize, Serialize};

use crate::Transport;
use crate::error::NetError;
use crate::frame::{read_frame, write_frame};

/// Request for the chunk at `index` of the manifest, expected to hash to `digest`.
///
/// Wire form: `{"chunk_checksum":"<16 hex>","chunk_index":N}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkRequest {
    #[serde(rename = "chunk_checksum")]
    pub digest: Digest,
    #[serde(rename = "chunk_index")]
    pub index: u64,
}

/// Send a chunk request as a JSON frame.
pub fn send_request<T: Transport + ?Sized>(
    channel: &mut T,
    request: &ChunkRequest,
) -> Result<(), NetError> {
    let payload =
        serde_json::to_vec(request).map_err(|e| NetError::Serialization(e.to_string()))?;
    write_frame(channel, &payload)
}

/// Receive and decode one chunk request frame.
pub fn recv_request<T: Transport + ?Sized>(channel: &mut T) -> Result<ChunkRequest, NetError> {
    let payload = read_frame(channel)?;
    serde_json::from_slice(&payload).map_err(|e| NetError::Serialization(e.to_string()))
}
