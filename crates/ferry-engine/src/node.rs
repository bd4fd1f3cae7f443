//! [`FerryNode`]: owns the store, the index and the configuration, and
//! exposes the send / receive / seed / collect-garbage pipeline.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use ferry_cas::{Chunker, DEFAULT_CHUNK_SIZE, DEFAULT_IO_BLOCK_SIZE};
use ferry_meta::MetaIndex;
use ferry_net::Transport;
use ferry_store::ChunkStore;
use ferry_types::Manifest;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::janitor::{self, GcReport};
use crate::receiver::{self, ReceiveReport};
use crate::reconcile::{self, Reconciliation};
use crate::seed::{self, SeedReport};
use crate::sender::{self, SendReport};

/// How files are cut into chunks.
///
/// Only fixed-size chunking is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    #[default]
    Fixed,
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkStrategy::Fixed => f.write_str("fixed"),
        }
    }
}

impl FromStr for ChunkStrategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(ChunkStrategy::Fixed),
            other => Err(EngineError::Config(format!(
                "unknown chunking strategy {other:?} (supported: fixed)"
            ))),
        }
    }
}

/// Configuration for creating a [`FerryNode`].
#[derive(Debug, Clone)]
pub struct FerryNodeConfig {
    /// Identity stamped into every manifest this node produces.
    pub source_id: u64,
    pub strategy: ChunkStrategy,
    /// Size of every chunk but the last one of a file.
    pub chunk_size: u64,
    /// Size of each read issued while chunking.
    pub io_block_size: usize,
    /// Capacity of the bounded fetch queue in pooled mode.
    pub prefetch_size: usize,
    /// Fetch worker threads. `1` runs the single-threaded download loop.
    pub workers: usize,
    /// Directory received files are written into.
    pub target_dir: PathBuf,
    /// Store and index the source file's chunks while sending it.
    pub store_on_send: bool,
}

impl Default for FerryNodeConfig {
    fn default() -> Self {
        Self {
            source_id: 0,
            strategy: ChunkStrategy::Fixed,
            chunk_size: DEFAULT_CHUNK_SIZE,
            io_block_size: DEFAULT_IO_BLOCK_SIZE,
            prefetch_size: 4,
            workers: 1,
            target_dir: PathBuf::from("."),
            store_on_send: false,
        }
    }
}

impl FerryNodeConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.chunk_size == 0 {
            return Err(EngineError::Config("chunk_size must be nonzero".into()));
        }
        if usize::try_from(self.chunk_size).is_err() {
            return Err(EngineError::Config(format!(
                "chunk_size {} does not fit in memory on this platform",
                self.chunk_size
            )));
        }
        if self.io_block_size == 0 {
            return Err(EngineError::Config("io_block_size must be nonzero".into()));
        }
        if self.workers == 0 {
            return Err(EngineError::Config("workers must be at least 1".into()));
        }
        if self.prefetch_size == 0 {
            return Err(EngineError::Config("prefetch_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// A sync endpoint: chunk store, metadata index and configuration.
pub struct FerryNode {
    config: FerryNodeConfig,
    store: Arc<dyn ChunkStore>,
    meta: Arc<MetaIndex>,
    chunker: Chunker,
}

impl FerryNode {
    /// Create a node, validating the configuration and creating the target
    /// directory if needed.
    pub fn new(
        config: FerryNodeConfig,
        store: Arc<dyn ChunkStore>,
        meta: Arc<MetaIndex>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        std::fs::create_dir_all(&config.target_dir).map_err(|e| {
            EngineError::Config(format!(
                "cannot create target directory {}: {e}",
                config.target_dir.display()
            ))
        })?;
        let chunker = match config.strategy {
            ChunkStrategy::Fixed => {
                Chunker::new(config.chunk_size).with_io_block_size(config.io_block_size)
            }
        };
        Ok(Self {
            config,
            store,
            meta,
            chunker,
        })
    }

    pub fn config(&self) -> &FerryNodeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    pub fn meta(&self) -> &Arc<MetaIndex> {
        &self.meta
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Chunk a file without touching the store or index.
    pub fn chunk_file(&self, path: &Path) -> Result<Manifest, EngineError> {
        Ok(self.chunker.chunk_file(path, self.config.source_id)?)
    }

    /// Chunk a file into the store and record its chunk locations.
    pub fn seed_file(&self, path: &Path) -> Result<Manifest, EngineError> {
        seed::seed_file(self, path)
    }

    /// Seed every non-empty file under the given files and directories.
    pub fn seed_paths(&self, paths: &[PathBuf]) -> Result<SeedReport, EngineError> {
        seed::seed_paths(self, paths)
    }

    /// Classify a manifest's chunks against this node's store and index.
    pub fn reconcile(&self, manifest: &Manifest) -> Result<Reconciliation, EngineError> {
        reconcile::reconcile(self.store.as_ref(), &self.meta, manifest)
    }

    /// Send `path` to the peer on `channel` and serve its chunk requests.
    pub fn send_file<T: Transport + ?Sized>(
        &self,
        channel: &mut T,
        path: &Path,
    ) -> Result<SendReport, EngineError> {
        sender::send_file(self, channel, path)
    }

    /// Receive one file from the peer on `channel` into the target directory.
    pub fn receive_file<T: Transport + ?Sized>(
        &self,
        channel: &mut T,
    ) -> Result<ReceiveReport, EngineError> {
        receiver::receive_file(self, channel)
    }

    /// Delete blobs and index rows for chunks no existing file references.
    pub fn collect_garbage(&self) -> Result<GcReport, EngineError> {
        janitor::collect_garbage(self.store.as_ref(), &self.meta)
    }
}

/// Absolute UTF-8 form of a path, as recorded in the index.
pub(crate) fn index_path(path: &Path) -> Result<String, EngineError> {
    let absolute = std::path::absolute(path)?;
    if let Some(s) = absolute.to_str() {
        return Ok(s.to_owned());
    }
    Err(EngineError::NonUtf8Path(absolute))
}
