//! Content addressing, chunking, and manifest encoding.
//!
//! This crate provides:
//! - [`digest`] / [`digest_stream`]: xxh3-64 fingerprints of buffers and files.
//! - [`Chunker`]: cuts a file into fixed-size chunks and builds its [`Manifest`].
//! - [`serialize_manifest`] / [`deserialize_manifest`]: the JSON wire form of a
//!   manifest, plus [`validate_manifest`] for manifests received from a peer.
//!
//! [`Manifest`]: ferry_types::Manifest

mod chunker;
mod error;
mod hasher;
mod manifest;

pub use chunker::{Chunker, DEFAULT_CHUNK_SIZE, DEFAULT_IO_BLOCK_SIZE, zeroed_buffer};
pub use error::CasError;
pub use hasher::{STREAM_BLOCK_SIZE, digest, digest_file, digest_stream};
pub use manifest::{
    MAX_MANIFEST_SIZE, deserialize_manifest, serialize_manifest, validate_manifest,
};
