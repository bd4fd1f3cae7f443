//! Chunk downloads: one request at a time, or spread over a worker pool.
//!
//! Requests go out over a single channel, so network I/O is serialized by
//! the [`PeerSource`] lock either way. The pool overlaps hashing and store
//! writes with the next request.

use std::collections::VecDeque;
use std::thread;

use crossbeam_channel::{bounded, unbounded};
use ferry_net::{ChunkRequest, ControlFlag, Transport, send_request, write_flag};
use ferry_store::ChunkStore;
use ferry_types::{Digest, Manifest};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::error::EngineError;
use crate::reconcile::MissingSet;

/// Something chunk bytes can be fetched from.
pub trait ChunkSource: Sync {
    /// Fetch the `size` bytes requested by `request`.
    fn fetch(&self, request: &ChunkRequest, size: u64) -> Result<Vec<u8>, EngineError>;
}

/// Fetches chunks from the sender on the other end of a channel.
pub struct PeerSource<'a, T: Transport + ?Sized> {
    channel: Mutex<&'a mut T>,
}

impl<'a, T: Transport + ?Sized> PeerSource<'a, T> {
    pub fn new(channel: &'a mut T) -> Self {
        Self {
            channel: Mutex::new(channel),
        }
    }
}

impl<T: Transport + ?Sized> ChunkSource for PeerSource<'_, T> {
    fn fetch(&self, request: &ChunkRequest, size: u64) -> Result<Vec<u8>, EngineError> {
        let len = usize::try_from(size).map_err(|_| EngineError::Allocation(usize::MAX))?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| EngineError::Allocation(len))?;
        buf.resize(len, 0);

        let mut channel = self.channel.lock();
        write_flag(&mut **channel, ControlFlag::Continue)?;
        send_request(&mut **channel, request)?;
        channel.read_exact(&mut buf)?;
        trace!(digest = %request.digest, index = request.index, size, "fetched chunk");
        Ok(buf)
    }
}

/// One chunk that was fetched, verified and stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkResponse {
    pub digest: Digest,
    pub index: u64,
    pub bytes: u64,
}

/// Totals for one download pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub chunks: usize,
    pub bytes: u64,
}

impl DownloadStats {
    fn record(&mut self, response: &ChunkResponse) {
        self.chunks += 1;
        self.bytes += response.bytes;
    }
}

fn download_one(
    source: &dyn ChunkSource,
    store: &dyn ChunkStore,
    manifest: &Manifest,
    request: &ChunkRequest,
) -> Result<ChunkResponse, EngineError> {
    let chunk = manifest
        .chunk(request.index)
        .filter(|c| c.digest == request.digest)
        .ok_or_else(|| {
            EngineError::Protocol(format!(
                "request for {} at index {} does not match the manifest",
                request.digest, request.index
            ))
        })?;

    let data = source.fetch(request, chunk.size)?;
    let actual = Digest::from_data(&data);
    if actual != chunk.digest {
        return Err(EngineError::Corruption {
            context: format!("downloaded chunk {}", request.index),
            expected: chunk.digest,
            actual,
        });
    }
    store.put(chunk.digest, &data)?;

    Ok(ChunkResponse {
        digest: chunk.digest,
        index: request.index,
        bytes: chunk.size,
    })
}

/// Download every queued request in order on the calling thread.
pub fn download_serial(
    source: &dyn ChunkSource,
    store: &dyn ChunkStore,
    manifest: &Manifest,
    mut queue: VecDeque<ChunkRequest>,
    missing: &mut MissingSet,
) -> Result<DownloadStats, EngineError> {
    let mut stats = DownloadStats::default();
    while let Some(request) = queue.pop_front() {
        if !missing.is_missing(request.digest) {
            continue;
        }
        let response = download_one(source, store, manifest, &request)?;
        missing.resolve(response.digest);
        stats.record(&response);
    }
    debug!(chunks = stats.chunks, bytes = stats.bytes, "serial download finished");
    Ok(stats)
}

/// Shared bookkeeping for the worker pool.
#[derive(Default)]
struct PoolState {
    remaining: usize,
    failed: usize,
    error: Option<EngineError>,
}

struct Pool {
    state: Mutex<PoolState>,
    changed: Condvar,
}

impl Pool {
    fn new() -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            changed: Condvar::new(),
        }
    }

    fn failed(&self) -> bool {
        self.state.lock().failed > 0
    }

    fn complete(&self) {
        let mut state = self.state.lock();
        state.remaining -= 1;
        self.changed.notify_all();
    }

    fn fail(&self, error: EngineError) {
        let mut state = self.state.lock();
        state.remaining -= 1;
        state.failed += 1;
        state.error.get_or_insert(error);
        self.changed.notify_all();
    }

    /// Block until every submitted request finished or one of them failed.
    fn wait(&self) {
        let mut state = self.state.lock();
        while state.remaining > 0 && state.failed == 0 {
            self.changed.wait(&mut state);
        }
    }
}

/// Download the queued requests with `workers` threads fed through a bounded
/// queue of `capacity` requests.
///
/// The first failure stops every worker and is returned. Chunks that were
/// already stored stay stored, but nothing is marked resolved on failure.
pub fn download_pooled(
    source: &dyn ChunkSource,
    store: &dyn ChunkStore,
    manifest: &Manifest,
    queue: VecDeque<ChunkRequest>,
    missing: &mut MissingSet,
    workers: usize,
    capacity: usize,
) -> Result<DownloadStats, EngineError> {
    let workers = workers.max(1);
    let (request_tx, request_rx) = bounded::<ChunkRequest>(capacity.max(1));
    let (result_tx, result_rx) = unbounded::<ChunkResponse>();
    let pool = Pool::new();

    thread::scope(|s| {
        for worker in 0..workers {
            let request_rx = request_rx.clone();
            let result_tx = result_tx.clone();
            let pool = &pool;
            s.spawn(move || {
                for request in request_rx.iter() {
                    if pool.failed() {
                        break;
                    }
                    match download_one(source, store, manifest, &request) {
                        Ok(response) => {
                            // The receiving end lives until the scope ends.
                            let _ = result_tx.send(response);
                            pool.complete();
                        }
                        Err(e) => {
                            warn!(worker, index = request.index, error = %e, "chunk download failed");
                            pool.fail(e);
                            break;
                        }
                    }
                }
            });
        }
        drop(request_rx);
        drop(result_tx);

        for request in queue {
            if !missing.is_missing(request.digest) {
                continue;
            }
            if pool.failed() {
                break;
            }
            pool.state.lock().remaining += 1;
            // Fails only once every worker has exited.
            if request_tx.send(request).is_err() {
                pool.state.lock().remaining -= 1;
                break;
            }
        }
        drop(request_tx);
        pool.wait();
    });

    if let Some(e) = pool.state.into_inner().error {
        return Err(e);
    }

    let mut stats = DownloadStats::default();
    for response in result_rx.try_iter() {
        missing.resolve(response.digest);
        stats.record(&response);
    }
    debug!(
        workers,
        chunks = stats.chunks,
        bytes = stats.bytes,
        "pooled download finished"
    );
    Ok(stats)
}
