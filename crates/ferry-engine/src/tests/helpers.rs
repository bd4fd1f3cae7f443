//! Shared test utilities for ferry-engine tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use ferry_meta::MetaIndex;
use ferry_net::{Channel, ChunkRequest};
use ferry_store::FileChunkStore;
use ferry_types::{ChunkMeta, Digest, Manifest};
use tempfile::TempDir;

use crate::error::EngineError;
use crate::fetch::ChunkSource;
use crate::node::{FerryNode, FerryNodeConfig};
use crate::receiver::ReceiveReport;
use crate::sender::SendReport;

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = 0xDEAD_BEEF;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// Same generator with a different seed, for content unrelated to `test_data`.
pub fn other_data(size: usize, seed: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state = seed;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// A node with an on-disk store, an in-memory index, and its own scratch
/// directory for source files.
pub struct TestNode {
    pub node: FerryNode,
    pub store: Arc<FileChunkStore>,
    pub meta: Arc<MetaIndex>,
    dir: TempDir,
}

impl TestNode {
    pub fn target_dir(&self) -> &Path {
        &self.node.config().target_dir
    }

    /// Directory for files the node holds outside its target directory.
    pub fn files_dir(&self) -> PathBuf {
        let dir = self.dir.path().join("files");
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn write_file(&self, name: &str, data: &[u8]) -> PathBuf {
        write_file(&self.files_dir(), name, data)
    }

    /// Digests currently held in the blob store.
    pub fn blob_count(&self) -> usize {
        use ferry_store::ChunkStore;
        self.store.list().unwrap().len()
    }
}

pub fn test_node(chunk_size: u64) -> TestNode {
    test_node_with(chunk_size, |_| {})
}

pub fn test_node_with(chunk_size: u64, configure: impl FnOnce(&mut FerryNodeConfig)) -> TestNode {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileChunkStore::new(dir.path().join("store")).unwrap());
    let meta = Arc::new(MetaIndex::open_in_memory().unwrap());

    let mut config = FerryNodeConfig {
        chunk_size,
        io_block_size: 4096,
        target_dir: dir.path().join("target"),
        ..FerryNodeConfig::default()
    };
    configure(&mut config);

    let node = FerryNode::new(config, store.clone(), meta.clone()).unwrap();
    TestNode {
        node,
        store,
        meta,
        dir,
    }
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    path
}

/// Send `path` from one node to another over an in-process channel.
pub fn transfer(
    sender: &FerryNode,
    receiver: &FerryNode,
    path: &Path,
) -> (
    Result<SendReport, EngineError>,
    Result<ReceiveReport, EngineError>,
) {
    let (mut tx_end, mut rx_end) = Channel::memory_pair();
    thread::scope(|s| {
        let handle = s.spawn(move || sender.send_file(&mut tx_end, path));
        let received = receiver.receive_file(&mut rx_end);
        drop(rx_end);
        let sent = handle.join().unwrap();
        (sent, received)
    })
}

/// Fixed-size manifest for an in-memory buffer.
pub fn manifest_for(data: &[u8], chunk_size: usize) -> Manifest {
    let chunks = data
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, piece)| ChunkMeta {
            digest: Digest::from_data(piece),
            cutpoint: (i * chunk_size) as u64,
            size: piece.len() as u64,
        })
        .collect();
    Manifest {
        file_name: "buffer.bin".into(),
        file_size: data.len() as u64,
        file_digest: Digest::from_data(data),
        source_id: 0,
        chunks,
    }
}

/// Serves chunks straight from a buffer, optionally failing or corrupting
/// one index.
pub struct SliceSource {
    data: Vec<u8>,
    manifest: Manifest,
    pub fail_at: Option<u64>,
    pub corrupt_at: Option<u64>,
    calls: AtomicUsize,
}

impl SliceSource {
    pub fn new(data: Vec<u8>, manifest: Manifest) -> Self {
        Self {
            data,
            manifest,
            fail_at: None,
            corrupt_at: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ChunkSource for SliceSource {
    fn fetch(&self, request: &ChunkRequest, size: u64) -> Result<Vec<u8>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(request.index) {
            return Err(EngineError::Protocol(format!("refusing index {}", request.index)));
        }
        let chunk = self.manifest.chunk(request.index).unwrap();
        assert_eq!(chunk.size, size);
        let start = chunk.cutpoint as usize;
        let mut bytes = self.data[start..start + size as usize].to_vec();
        if self.corrupt_at == Some(request.index) {
            bytes[0] ^= 0xFF;
        }
        Ok(bytes)
    }
}
