//! Sending side of a transfer.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use ferry_net::{ControlFlag, Transport, read_flag, recv_request};
use ferry_types::{Digest, Manifest};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::node::FerryNode;
use crate::wire::send_manifest;

/// Summary of one completed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub file_name: String,
    pub file_size: u64,
    pub chunks: usize,
    pub requests_served: usize,
    pub bytes_sent: u64,
}

pub(crate) fn send_file<T: Transport + ?Sized>(
    node: &FerryNode,
    channel: &mut T,
    path: &Path,
) -> Result<SendReport, EngineError> {
    let manifest = if node.config().store_on_send {
        node.seed_file(path)?
    } else {
        node.chunk_file(path)?
    };
    send_manifest(channel, &manifest)?;

    let (requests_served, bytes_sent) = serve_requests(channel, path, &manifest)?;
    let report = SendReport {
        file_name: manifest.file_name.clone(),
        file_size: manifest.file_size,
        chunks: manifest.chunk_count(),
        requests_served,
        bytes_sent,
    };
    info!(
        file_name = %report.file_name,
        file_size = report.file_size,
        chunks = report.chunks,
        requests = report.requests_served,
        bytes_sent = report.bytes_sent,
        "send complete"
    );
    Ok(report)
}

/// Answer chunk requests for `manifest` from the file at `path` until the
/// peer sends the stop flag.
///
/// Returns the number of requests served and the bytes written. A request
/// whose index or digest is not in the manifest ends the session with a
/// protocol error. Chunk bytes are re-hashed before being sent, so a source
/// file that changed since chunking is reported as corruption.
pub fn serve_requests<T: Transport + ?Sized>(
    channel: &mut T,
    path: &Path,
    manifest: &Manifest,
) -> Result<(usize, u64), EngineError> {
    let mut file = File::open(path)?;
    let mut buf = Vec::new();
    let mut served = 0usize;
    let mut bytes = 0u64;

    loop {
        if read_flag(channel)? == ControlFlag::Stop {
            debug!(served, "peer sent stop");
            break;
        }
        let request = recv_request(channel)?;
        let chunk = manifest.chunk(request.index).ok_or_else(|| {
            EngineError::Protocol(format!(
                "chunk index {} out of range ({} chunks)",
                request.index,
                manifest.chunk_count()
            ))
        })?;
        if chunk.digest != request.digest {
            return Err(EngineError::Protocol(format!(
                "chunk {} is {}, not {}",
                request.index, chunk.digest, request.digest
            )));
        }

        let len = usize::try_from(chunk.size).map_err(|_| EngineError::Allocation(usize::MAX))?;
        buf.clear();
        buf.try_reserve_exact(len)
            .map_err(|_| EngineError::Allocation(len))?;
        buf.resize(len, 0);
        file.seek(SeekFrom::Start(chunk.cutpoint))?;
        file.read_exact(&mut buf)?;

        let actual = Digest::from_data(&buf);
        if actual != chunk.digest {
            return Err(EngineError::Corruption {
                context: format!("{} at offset {}", path.display(), chunk.cutpoint),
                expected: chunk.digest,
                actual,
            });
        }

        channel.write_all(&buf)?;
        served += 1;
        bytes += chunk.size;
    }
    Ok((served, bytes))
}
