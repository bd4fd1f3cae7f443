//! `ferryd`: content-addressed file sync between two endpoints.
//!
//! # Usage
//!
//! ```text
//! ferryd receive -c ferry.toml             # wait for one file
//! ferryd send ./disk.img -c ferry.toml     # push a file to the receiver
//! ferryd seed ~/isos ~/backups             # index local files for reuse
//! ferryd gc                                # drop chunks of deleted files
//! ferryd manifest ./disk.img               # print a file's manifest
//! ferryd status                            # index and store counts
//! ```

mod config;

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ferry_cas::serialize_manifest;
use ferry_engine::FerryNode;
use ferry_meta::MetaIndex;
use ferry_net::{Channel, ChannelKind, Role, TcpChannel, Transport};
use ferry_store::{ChunkStore, FileChunkStore};
use tracing::{debug, error, info};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "ferryd", version, about = "Content-addressed file sync")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one file to a waiting receiver.
    Send {
        /// File to send.
        file: PathBuf,

        /// Override the channel address (TCP) to connect to.
        #[arg(short, long)]
        address: Option<String>,
    },

    /// Receive one file into the target directory.
    Receive {
        /// Override the target directory.
        #[arg(short, long)]
        target_dir: Option<PathBuf>,

        /// Override the channel address (TCP) to listen on.
        #[arg(short, long)]
        address: Option<String>,

        /// Override the number of fetch workers.
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Chunk local files or directory trees into the store and index.
    Seed {
        /// Files or directories to seed.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Remove chunks no existing file references.
    Gc,

    /// Print the manifest of a file as JSON.
    Manifest {
        /// File to chunk.
        file: PathBuf,
    },

    /// Show index and chunk store counts.
    Status,
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{e:#}");
        eprintln!("ferryd: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Send { file, address } => {
            if let Some(addr) = address {
                config.channel.address = addr;
            }
            cmd_send(&config, &file)
        }
        Commands::Receive {
            target_dir,
            address,
            workers,
        } => {
            // CLI args override config file values.
            if let Some(dir) = target_dir {
                config.storage.target_dir = dir;
            }
            if let Some(addr) = address {
                config.channel.address = addr;
            }
            if let Some(n) = workers {
                config.engine.workers = n;
            }
            cmd_receive(&config)
        }
        Commands::Seed { paths } => cmd_seed(&config, &paths),
        Commands::Gc => cmd_gc(&config),
        Commands::Manifest { file } => cmd_manifest(&config, &file),
        Commands::Status => cmd_status(&config),
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Open the chunk store and metadata index and build a node.
fn open_node(config: &CliConfig) -> Result<FerryNode> {
    let node_config = config.node_config().context("invalid [engine] configuration")?;

    let store_dir = &config.storage.metadata_loc;
    let store = FileChunkStore::new(store_dir)
        .with_context(|| format!("cannot open chunk store at {}", store_dir.display()))?;

    let db_path = &config.storage.database_path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let meta = MetaIndex::open(db_path)
        .with_context(|| format!("cannot open metadata index at {}", db_path.display()))?;

    Ok(FerryNode::new(node_config, Arc::new(store), Arc::new(meta))?)
}

/// Open this endpoint's side of the configured channel.
fn open_channel(config: &CliConfig, role: Role) -> Result<Channel> {
    let timeout = config.channel_timeout();
    match config.channel.kind {
        ChannelKind::Fifo => open_fifo(&config.channel.fifo_dir, role),
        ChannelKind::Tcp => {
            let addr = &config.channel.address;
            let channel = match role {
                Role::Sender => TcpChannel::connect(addr.as_str(), timeout)
                    .with_context(|| format!("cannot connect to receiver at {addr}"))?,
                Role::Receiver => {
                    let listener = TcpListener::bind(addr.as_str())
                        .with_context(|| format!("cannot listen on {addr}"))?;
                    info!(%addr, "waiting for sender");
                    TcpChannel::accept(&listener, timeout).context("accept failed")?
                }
            };
            Ok(Channel::Tcp(channel))
        }
    }
}

#[cfg(unix)]
fn open_fifo(dir: &Path, role: Role) -> Result<Channel> {
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    info!(dir = %dir.display(), ?role, "opening fifo channel");
    let channel = ferry_net::FifoChannel::open(dir, role)
        .with_context(|| format!("cannot open fifos in {}", dir.display()))?;
    Ok(Channel::Fifo(channel))
}

#[cfg(not(unix))]
fn open_fifo(_dir: &Path, _role: Role) -> Result<Channel> {
    anyhow::bail!("fifo channels are only available on unix; use kind = \"tcp\"")
}

// -----------------------------------------------------------------------
// ferryd send / receive
// -----------------------------------------------------------------------

fn cmd_send(config: &CliConfig, file: &Path) -> Result<()> {
    let node = open_node(config)?;
    let mut channel = open_channel(config, Role::Sender)?;
    let start = Instant::now();

    let report = node
        .send_file(&mut channel, file)
        .with_context(|| format!("failed to send {}", file.display()))?;
    close_channel(&mut channel);

    println!(
        "sent {} ({} bytes, {} chunks): {} requested, {} bytes on the wire in {:.2?}",
        report.file_name,
        report.file_size,
        report.chunks,
        report.requests_served,
        report.bytes_sent,
        start.elapsed(),
    );
    Ok(())
}

fn cmd_receive(config: &CliConfig) -> Result<()> {
    let node = open_node(config)?;
    let mut channel = open_channel(config, Role::Receiver)?;
    let start = Instant::now();

    let report = node.receive_file(&mut channel).context("receive failed")?;
    close_channel(&mut channel);

    println!(
        "received {} ({} bytes, {} chunks) in {:.2?}",
        report.destination.display(),
        report.file_size,
        report.chunks,
        start.elapsed(),
    );
    println!(
        "  local={} scavenged={} remote={} downloaded={} bytes",
        report.local, report.scavenged, report.remote, report.downloaded_bytes,
    );
    Ok(())
}

// -----------------------------------------------------------------------
// ferryd seed / gc
// -----------------------------------------------------------------------

fn cmd_seed(config: &CliConfig, paths: &[PathBuf]) -> Result<()> {
    let node = open_node(config)?;
    let report = node.seed_paths(paths).context("seeding failed")?;
    println!(
        "seeded {} files ({} chunks, {} bytes), {} new index rows, {} empty files skipped",
        report.files, report.chunks, report.bytes, report.rows_inserted, report.skipped,
    );
    Ok(())
}

fn cmd_gc(config: &CliConfig) -> Result<()> {
    let node = open_node(config)?;
    let report = node.collect_garbage().context("garbage collection failed")?;
    println!(
        "examined {} digests: removed {} ({} blobs, {} index rows)",
        report.digests_examined, report.digests_removed, report.blobs_deleted, report.rows_deleted,
    );
    Ok(())
}

// -----------------------------------------------------------------------
// ferryd manifest / status
// -----------------------------------------------------------------------

fn cmd_manifest(config: &CliConfig, file: &Path) -> Result<()> {
    let node_config = config.node_config().context("invalid [engine] configuration")?;
    let chunker = ferry_cas::Chunker::new(node_config.chunk_size)
        .with_io_block_size(node_config.io_block_size);
    let manifest = chunker
        .chunk_file(file, node_config.source_id)
        .with_context(|| format!("cannot chunk {}", file.display()))?;
    let json = serialize_manifest(&manifest)?;
    println!("{}", String::from_utf8_lossy(&json));
    Ok(())
}

fn cmd_status(config: &CliConfig) -> Result<()> {
    let db_path = &config.storage.database_path;
    let meta = MetaIndex::open(db_path).map_err(|e| {
        error!(path = %db_path.display(), %e, "failed to open metadata index");
        anyhow::anyhow!("cannot open metadata index at {} ({e})", db_path.display())
    })?;
    let rows = meta.row_count()?;
    let files = {
        let mut paths: Vec<String> = meta.list_all()?.into_iter().map(|(_, p)| p).collect();
        paths.sort();
        paths.dedup();
        paths.len()
    };
    println!("Index rows: {rows} across {files} files");

    let store = FileChunkStore::new(&config.storage.metadata_loc)?;
    let blobs = store.list()?.len();
    println!(
        "Chunk store: {blobs} blobs in {}",
        config.storage.metadata_loc.display()
    );

    let missing = ferry_engine::janitor::missing_blobs(&store, &meta)?;
    if !missing.is_empty() {
        println!("Indexed chunks without a blob: {}", missing.len());
        for digest in missing {
            debug!(%digest, "indexed chunk has no blob");
        }
    }
    Ok(())
}

/// Best-effort close once a session is over.
fn close_channel(channel: &mut Channel) {
    if let Err(e) = channel.close() {
        debug!(kind = channel.kind_name(), error = %e, "channel close failed");
    }
}
