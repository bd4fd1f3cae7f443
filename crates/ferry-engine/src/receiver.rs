//! Receiving side of a transfer.
//!
//! A receive walks `AwaitManifest → Reconcile → DownloadLoop → Reassemble →
//! Verify → Commit`. The output is assembled in a temporary file inside the
//! target directory and only renamed to its final name after the whole-file
//! digest matches, so a failed receive never leaves a file at the destination.

use std::collections::VecDeque;
use std::fmt;
use std::io::{Seek, Write};
use std::path::{Component, Path, PathBuf};

use ferry_cas::digest_stream;
use ferry_net::{ChunkRequest, ControlFlag, Transport, write_flag};
use ferry_types::{Digest, Manifest};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::fetch::{DownloadStats, PeerSource, download_pooled, download_serial};
use crate::node::{FerryNode, index_path};
use crate::reconcile::{ChunkState, MissingSet};
use crate::wire::recv_manifest;

/// Receiver stages, used to report where a receive failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveStage {
    AwaitManifest,
    Reconcile,
    DownloadLoop,
    Reassemble,
    Verify,
    Commit,
}

impl fmt::Display for ReceiveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReceiveStage::AwaitManifest => "await-manifest",
            ReceiveStage::Reconcile => "reconcile",
            ReceiveStage::DownloadLoop => "download-loop",
            ReceiveStage::Reassemble => "reassemble",
            ReceiveStage::Verify => "verify",
            ReceiveStage::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// Summary of one completed receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveReport {
    /// Final path of the received file.
    pub destination: PathBuf,
    pub file_size: u64,
    pub chunks: usize,
    pub local: usize,
    pub scavenged: usize,
    pub remote: usize,
    pub downloaded_chunks: usize,
    pub downloaded_bytes: u64,
    /// Index rows added for the destination file.
    pub rows_inserted: usize,
}

struct Session<'a, T: Transport + ?Sized> {
    node: &'a FerryNode,
    channel: &'a mut T,
    stage: ReceiveStage,
    stop_sent: bool,
}

pub(crate) fn receive_file<T: Transport + ?Sized>(
    node: &FerryNode,
    channel: &mut T,
) -> Result<ReceiveReport, EngineError> {
    let mut session = Session {
        node,
        channel,
        stage: ReceiveStage::AwaitManifest,
        stop_sent: false,
    };

    match session.run() {
        Ok(report) => {
            info!(
                destination = %report.destination.display(),
                file_size = report.file_size,
                chunks = report.chunks,
                local = report.local,
                scavenged = report.scavenged,
                remote = report.remote,
                downloaded_bytes = report.downloaded_bytes,
                "receive complete"
            );
            Ok(report)
        }
        Err(e) => {
            if !session.stop_sent
                && let Err(stop_err) = write_flag(session.channel, ControlFlag::Stop)
            {
                warn!(error = %stop_err, "could not send stop flag after failure");
            }
            error!(stage = %session.stage, error = %e, "receive failed");
            Err(e)
        }
    }
}

impl<T: Transport + ?Sized> Session<'_, T> {
    fn enter(&mut self, stage: ReceiveStage) {
        debug!(from = %self.stage, to = %stage, "receive stage");
        self.stage = stage;
    }

    fn run(&mut self) -> Result<ReceiveReport, EngineError> {
        let node = self.node;
        let manifest = recv_manifest(self.channel)?;
        let destination = destination_path(&node.config().target_dir, &manifest.file_name)?;
        let dest_key = index_path(&destination)?;

        self.enter(ReceiveStage::Reconcile);
        let mut reconciliation = node.reconcile(&manifest)?;

        self.enter(ReceiveStage::DownloadLoop);
        let queue = std::mem::take(&mut reconciliation.downloads);
        let stats = self.download(&manifest, queue, &mut reconciliation.missing)?;
        write_flag(self.channel, ControlFlag::Stop)?;
        self.stop_sent = true;
        if !reconciliation.missing.is_complete() {
            return Err(EngineError::Protocol(format!(
                "{} chunks still missing after download",
                reconciliation.missing.remaining()
            )));
        }

        self.enter(ReceiveStage::Reassemble);
        let mut output = self.reassemble(&manifest)?;

        self.enter(ReceiveStage::Verify);
        let actual = digest_stream(output.as_file_mut())?;
        if actual != manifest.file_digest {
            return Err(EngineError::Corruption {
                context: format!("reassembled {}", destination.display()),
                expected: manifest.file_digest,
                actual,
            });
        }

        self.enter(ReceiveStage::Commit);
        output
            .persist(&destination)
            .map_err(|e| EngineError::Io(e.error))?;
        let rows_inserted = node.meta().insert_chunks(&manifest, &dest_key)?;

        Ok(ReceiveReport {
            destination,
            file_size: manifest.file_size,
            chunks: manifest.chunk_count(),
            local: reconciliation.count(ChunkState::Local),
            scavenged: reconciliation.count(ChunkState::Scavenged),
            remote: reconciliation.count(ChunkState::Remote),
            downloaded_chunks: stats.chunks,
            downloaded_bytes: stats.bytes,
            rows_inserted,
        })
    }

    fn download(
        &mut self,
        manifest: &Manifest,
        queue: VecDeque<ChunkRequest>,
        missing: &mut MissingSet,
    ) -> Result<DownloadStats, EngineError> {
        if queue.is_empty() {
            return Ok(DownloadStats::default());
        }
        let node = self.node;
        let store = node.store().as_ref();
        let source = PeerSource::new(&mut *self.channel);
        let config = node.config();
        if config.workers > 1 {
            download_pooled(
                &source,
                store,
                manifest,
                queue,
                missing,
                config.workers,
                config.prefetch_size,
            )
        } else {
            download_serial(&source, store, manifest, queue, missing)
        }
    }

    /// Write every chunk in manifest order into a fresh temporary file in the
    /// target directory.
    fn reassemble(&self, manifest: &Manifest) -> Result<NamedTempFile, EngineError> {
        let target_dir = &self.node.config().target_dir;
        let mut output = tempfile::Builder::new()
            .prefix(".ferry-")
            .suffix(".part")
            .tempfile_in(target_dir)?;

        let store = self.node.store();
        let mut remaining = manifest.file_size;
        for chunk in &manifest.chunks {
            let len = remaining.min(chunk.size);
            let data = store.get(chunk.digest)?.ok_or_else(|| {
                EngineError::Protocol(format!("chunk {} vanished from the store", chunk.digest))
            })?;
            let len = usize::try_from(len).map_err(|_| EngineError::Allocation(usize::MAX))?;
            let piece = data.get(..len).ok_or_else(|| EngineError::Corruption {
                context: format!("stored chunk shorter than {len} bytes"),
                expected: chunk.digest,
                actual: Digest::from_data(&data),
            })?;
            output.write_all(piece)?;
            remaining -= len as u64;
        }
        output.as_file_mut().flush()?;
        output.as_file_mut().rewind()?;
        Ok(output)
    }
}

/// Final path for a received file: the basename of the sender's file name,
/// inside `target_dir`.
fn destination_path(target_dir: &Path, file_name: &str) -> Result<PathBuf, EngineError> {
    let reject = || EngineError::Protocol(format!("unusable file name {file_name:?}"));
    // Either separator counts, whatever platform the sender ran on.
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|b| !b.is_empty())
        .ok_or_else(reject)?;
    let mut components = Path::new(base).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => Ok(target_dir.join(name)),
        _ => Err(reject()),
    }
}
