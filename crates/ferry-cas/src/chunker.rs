//! Fixed-size file chunker.
//!
//! The file is read in I/O blocks of `io_block_size` bytes, independent of the
//! chunk size, and each block is cut into chunk-sized pieces. A chunk may
//! straddle two I/O blocks. The final chunk carries its true length
//! (`file_size - cutpoint`), never a padded `chunk_size`.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use ferry_types::{ChunkMeta, Digest, Manifest};
use tracing::{debug, trace};

use crate::error::CasError;
use crate::hasher::digest_stream;

/// Default chunk size: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024;

/// Default I/O block size: 1 MiB.
pub const DEFAULT_IO_BLOCK_SIZE: usize = 1024 * 1024;

/// Allocate a zero-filled buffer, reporting allocation failure as an error.
pub fn zeroed_buffer(len: usize) -> Result<Vec<u8>, CasError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| CasError::Allocation(len))?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Fixed-size chunker producing a [`Manifest`] for a file on disk.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: u64,
    io_block_size: usize,
}

impl Chunker {
    /// Create a chunker cutting `chunk_size`-byte chunks with the default I/O block.
    pub fn new(chunk_size: u64) -> Self {
        Self {
            chunk_size,
            io_block_size: DEFAULT_IO_BLOCK_SIZE,
        }
    }

    /// Override the size of each read issued against the file.
    pub fn with_io_block_size(mut self, io_block_size: usize) -> Self {
        self.io_block_size = io_block_size;
        self
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn io_block_size(&self) -> usize {
        self.io_block_size
    }

    /// Chunk a file and build its manifest.
    pub fn chunk_file(&self, path: &Path, source_id: u64) -> Result<Manifest, CasError> {
        self.chunk_file_with(path, source_id, |_, _| Ok::<(), CasError>(()))
    }

    /// Chunk a file, handing every chunk's bytes to `on_chunk` as it is cut.
    ///
    /// This is the store-while-chunking entry point: callers persist each
    /// piece without re-reading the file. An error from `on_chunk` aborts
    /// chunking and is returned unchanged.
    pub fn chunk_file_with<E, F>(
        &self,
        path: &Path,
        source_id: u64,
        mut on_chunk: F,
    ) -> Result<Manifest, E>
    where
        E: From<CasError>,
        F: FnMut(&ChunkMeta, &[u8]) -> Result<(), E>,
    {
        let invalid = || CasError::InvalidSizes {
            chunk_size: self.chunk_size,
            io_block_size: self.io_block_size,
        };
        let chunk_size = usize::try_from(self.chunk_size)
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(invalid)?;
        if self.io_block_size == 0 {
            return Err(invalid().into());
        }

        let mut file = File::open(path).map_err(|source| CasError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let file_size = file.metadata().map_err(CasError::from)?.len();
        if file_size == 0 {
            return Err(CasError::EmptyFile(path.to_path_buf()).into());
        }

        let mut block = zeroed_buffer(self.io_block_size)?;
        let mut pending: Vec<u8> = Vec::new();
        pending
            .try_reserve_exact(chunk_size)
            .map_err(|_| CasError::Allocation(chunk_size))?;

        let mut chunks = Vec::new();
        let mut cutpoint = 0u64;

        loop {
            let n = read_block(&mut file, &mut block).map_err(CasError::from)?;
            if n == 0 {
                break;
            }

            let mut rest = &block[..n];
            while !rest.is_empty() {
                // Whole chunk available inside this block: hash it in place.
                if pending.is_empty() && rest.len() >= chunk_size {
                    let (piece, tail) = rest.split_at(chunk_size);
                    emit_chunk(piece, &mut cutpoint, &mut chunks, &mut on_chunk)?;
                    rest = tail;
                    continue;
                }

                let take = (chunk_size - pending.len()).min(rest.len());
                pending.extend_from_slice(&rest[..take]);
                rest = &rest[take..];
                if pending.len() == chunk_size {
                    emit_chunk(&pending, &mut cutpoint, &mut chunks, &mut on_chunk)?;
                    pending.clear();
                }
            }
        }

        if !pending.is_empty() {
            emit_chunk(&pending, &mut cutpoint, &mut chunks, &mut on_chunk)?;
        }

        if cutpoint != file_size {
            return Err(CasError::SizeChanged {
                path: path.to_path_buf(),
                expected: file_size,
                actual: cutpoint,
            }
            .into());
        }

        let file_digest = digest_stream(&mut file)?;

        debug!(
            path = %path.display(),
            file_size,
            %file_digest,
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            "chunked file"
        );

        Ok(Manifest {
            file_name: path.to_string_lossy().into_owned(),
            file_size,
            file_digest,
            source_id,
            chunks,
        })
    }
}

fn emit_chunk<E, F>(
    piece: &[u8],
    cutpoint: &mut u64,
    chunks: &mut Vec<ChunkMeta>,
    on_chunk: &mut F,
) -> Result<(), E>
where
    F: FnMut(&ChunkMeta, &[u8]) -> Result<(), E>,
{
    let meta = ChunkMeta {
        digest: Digest::from_data(piece),
        cutpoint: *cutpoint,
        size: piece.len() as u64,
    };
    trace!(digest = %meta.digest, cutpoint = meta.cutpoint, size = meta.size, "cut chunk");
    on_chunk(&meta, piece)?;
    *cutpoint += meta.size;
    chunks.push(meta);
    Ok(())
}

/// Fill `buf` from `reader`, stopping early only at EOF.
fn read_block(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
