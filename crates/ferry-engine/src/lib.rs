//! Reconciliation and transfer engine.
//!
//! The [`FerryNode`] owns a chunk store, a metadata index and the node
//! configuration, and exposes the full pipeline:
//!
//! - **send**: chunk a file, ship its manifest, then serve chunk requests
//!   until the receiver says stop.
//! - **receive**: read a manifest, classify every chunk as local, scavenged
//!   or remote, fetch the remote ones, reassemble into a temporary file,
//!   verify the whole-file digest, then rename into place and index it.
//! - **seed**: chunk local files into the store and index so later receives
//!   can reuse them.
//! - **collect garbage**: drop blobs no surviving file references.

pub mod error;
pub mod fetch;
pub mod janitor;
pub mod node;
pub mod receiver;
pub mod reconcile;
pub mod seed;
pub mod sender;
mod wire;

pub use error::EngineError;
pub use fetch::{ChunkResponse, ChunkSource, DownloadStats, PeerSource, download_pooled, download_serial};
pub use janitor::{GcReport, collect_garbage};
pub use node::{ChunkStrategy, FerryNode, FerryNodeConfig};
pub use receiver::{ReceiveReport, ReceiveStage};
pub use reconcile::{ChunkState, MissingSet, Reconciliation, reconcile};
pub use seed::SeedReport;
pub use sender::{SendReport, serve_requests};

#[cfg(test)]
mod tests;
