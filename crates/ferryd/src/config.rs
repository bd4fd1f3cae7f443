//! TOML configuration for `ferryd`.
//!
//! Every section is optional; missing keys take the defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use ferry_engine::{ChunkStrategy, FerryNodeConfig};
use ferry_net::ChannelKind;
use serde::Deserialize;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Chunking and transfer tuning.
    pub engine: EngineSection,
    /// Chunk store, index and output locations.
    pub storage: StorageSection,
    /// Transport between sender and receiver.
    pub channel: ChannelSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[engine]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Chunking strategy. Only `"fixed"` is supported.
    pub strategy: String,
    /// Size of every chunk but the last, in bytes.
    pub chunk_size: u64,
    /// Read size used while chunking.
    pub io_block_size: usize,
    /// Fetch queue capacity when `workers > 1`.
    pub prefetch_size: usize,
    /// Fetch worker threads; 1 keeps downloads on the calling thread.
    pub workers: usize,
    /// Identity stamped into manifests this node sends.
    pub source_id: u64,
    /// Also store and index a file's chunks when sending it.
    pub store_on_send: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        let defaults = FerryNodeConfig::default();
        Self {
            strategy: defaults.strategy.to_string(),
            chunk_size: defaults.chunk_size,
            io_block_size: defaults.io_block_size,
            prefetch_size: defaults.prefetch_size,
            workers: defaults.workers,
            source_id: defaults.source_id,
            store_on_send: defaults.store_on_send,
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Chunk store directory, one blob per digest.
    pub metadata_loc: PathBuf,
    /// Where received files are written.
    pub target_dir: PathBuf,
    /// SQLite metadata index file.
    pub database_path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            metadata_loc: PathBuf::from("tmp/"),
            target_dir: PathBuf::from("."),
            database_path: PathBuf::from("ferry.db"),
        }
    }
}

/// `[channel]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ChannelSection {
    /// `"fifo"` (default) or `"tcp"`.
    pub kind: ChannelKind,
    /// Directory holding the `request` and `response` FIFOs.
    pub fifo_dir: PathBuf,
    /// Receiver listen address / sender connect address.
    pub address: String,
    /// Read/write timeout for TCP channels. Unset means block forever.
    pub timeout_secs: Option<u64>,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            kind: ChannelKind::Fifo,
            fifo_dir: PathBuf::from("fifo"),
            address: "127.0.0.1:4830".to_string(),
            timeout_secs: None,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or use defaults if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("cannot read {}", p.display()))?;
                let config: CliConfig = toml::from_str(&content)
                    .with_context(|| format!("invalid config file {}", p.display()))?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Engine configuration for building a node.
    pub fn node_config(&self) -> anyhow::Result<FerryNodeConfig> {
        let strategy: ChunkStrategy = self.engine.strategy.parse()?;
        let config = FerryNodeConfig {
            source_id: self.engine.source_id,
            strategy,
            chunk_size: self.engine.chunk_size,
            io_block_size: self.engine.io_block_size,
            prefetch_size: self.engine.prefetch_size,
            workers: self.engine.workers,
            target_dir: self.storage.target_dir.clone(),
            store_on_send: self.engine.store_on_send,
        };
        config.validate()?;
        Ok(config)
    }

    /// Channel timeout, if configured.
    pub fn channel_timeout(&self) -> Option<Duration> {
        self.channel.timeout_secs.map(Duration::from_secs)
    }
}
