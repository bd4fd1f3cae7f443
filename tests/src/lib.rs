//! Shared test harness for ferry integration tests.
//!
//! Provides [`Endpoint`], a node with an on-disk chunk store and SQLite index
//! in its own temporary directory, and helpers that run a sender and a
//! receiver on two threads over a memory, TCP or FIFO channel.

use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ferry_engine::{EngineError, FerryNode, FerryNodeConfig, ReceiveReport, SendReport};
use ferry_meta::MetaIndex;
use ferry_net::{Channel, TcpChannel};
use ferry_store::{ChunkStore, FileChunkStore};
use tempfile::TempDir;

pub const KIB: usize = 1024;
pub const MIB: usize = 1024 * KIB;

/// Outcome of one sender/receiver session.
pub type Session = (
    Result<SendReport, EngineError>,
    Result<ReceiveReport, EngineError>,
);

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    seeded_data(size, 0xDEAD_BEEF)
}

/// Same generator from another starting state.
pub fn seeded_data(size: usize, seed: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state = seed;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// One ferry endpoint rooted in a temporary directory:
/// `chunks/` (store), `index.db`, `target/` and `files/`.
pub struct Endpoint {
    pub node: FerryNode,
    pub store: Arc<FileChunkStore>,
    pub meta: Arc<MetaIndex>,
    config: FerryNodeConfig,
    dir: TempDir,
}

impl Endpoint {
    pub fn new(chunk_size: usize) -> Self {
        Self::with_config(FerryNodeConfig {
            chunk_size: chunk_size as u64,
            ..FerryNodeConfig::default()
        })
    }

    /// Build an endpoint; `target_dir` is always replaced by one inside the
    /// endpoint's directory.
    pub fn with_config(mut config: FerryNodeConfig) -> Self {
        let dir = TempDir::new().unwrap();
        config.target_dir = dir.path().join("target");
        let store = Arc::new(FileChunkStore::new(dir.path().join("chunks")).unwrap());
        let meta = Arc::new(MetaIndex::open(dir.path().join("index.db")).unwrap());
        let node = FerryNode::new(config.clone(), store.clone(), meta.clone()).unwrap();
        Self {
            node,
            store,
            meta,
            config,
            dir,
        }
    }

    /// Drop and reopen the store and index from disk, as a new process would.
    pub fn restart(self) -> Self {
        let Self {
            node,
            store,
            meta,
            config,
            dir,
        } = self;
        drop(node);
        drop(store);
        drop(meta);
        let store = Arc::new(FileChunkStore::new(dir.path().join("chunks")).unwrap());
        let meta = Arc::new(MetaIndex::open(dir.path().join("index.db")).unwrap());
        let node = FerryNode::new(config.clone(), store.clone(), meta.clone()).unwrap();
        Self {
            node,
            store,
            meta,
            config,
            dir,
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn target_dir(&self) -> &Path {
        &self.node.config().target_dir
    }

    pub fn write_file(&self, name: &str, data: &[u8]) -> PathBuf {
        let dir = self.dir.path().join("files");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, data).unwrap();
        path
    }

    pub fn blob_count(&self) -> usize {
        self.store.list().unwrap().len()
    }

    pub fn row_count(&self) -> u64 {
        self.meta.row_count().unwrap()
    }
}

/// Run a session over an in-process channel.
pub fn transfer(sender: &Endpoint, receiver: &Endpoint, path: &Path) -> Session {
    let (tx_end, rx_end) = Channel::memory_pair();
    run_session(sender, tx_end, receiver, rx_end, path)
}

/// Run a session over a loopback TCP connection.
pub fn transfer_tcp(sender: &Endpoint, receiver: &Endpoint, path: &Path) -> Session {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let timeout = Some(Duration::from_secs(30));

    thread::scope(|s| {
        let accept = s.spawn(|| TcpChannel::accept(&listener, timeout).unwrap());
        let tx_end = TcpChannel::connect(addr, timeout).unwrap();
        let rx_end = accept.join().unwrap();
        run_session(sender, Channel::Tcp(tx_end), receiver, Channel::Tcp(rx_end), path)
    })
}

/// Run a session over a pair of named pipes in `fifo_dir`.
#[cfg(unix)]
pub fn transfer_fifo(sender: &Endpoint, receiver: &Endpoint, path: &Path, fifo_dir: &Path) -> Session {
    use ferry_net::{FifoChannel, Role};

    thread::scope(|s| {
        let send = s.spawn(|| {
            let mut channel = Channel::Fifo(FifoChannel::open(fifo_dir, Role::Sender).unwrap());
            sender.node.send_file(&mut channel, path)
        });
        let mut channel = Channel::Fifo(FifoChannel::open(fifo_dir, Role::Receiver).unwrap());
        let received = receiver.node.receive_file(&mut channel);
        drop(channel);
        (send.join().unwrap(), received)
    })
}

fn run_session(
    sender: &Endpoint,
    mut tx_end: Channel,
    receiver: &Endpoint,
    mut rx_end: Channel,
    path: &Path,
) -> Session {
    thread::scope(|s| {
        let send = s.spawn(move || sender.node.send_file(&mut tx_end, path));
        let received = receiver.node.receive_file(&mut rx_end);
        drop(rx_end);
        (send.join().unwrap(), received)
    })
}
