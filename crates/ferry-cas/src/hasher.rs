//! xxh3-64 fingerprints of buffers and seekable streams.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use ferry_types::Digest;
use xxhash_rust::xxh3::Xxh3;

use crate::error::CasError;

/// Block size used when streaming a file through the incremental hasher.
pub const STREAM_BLOCK_SIZE: usize = 16 * 1024;

/// Fingerprint an in-memory buffer.
pub fn digest(data: &[u8]) -> Digest {
    Digest::from_data(data)
}

/// Fingerprint everything a reader yields from offset 0 to EOF.
///
/// The reader is rewound first, so the same handle can be re-digested any
/// number of times. The result equals [`digest`] over the same bytes.
pub fn digest_stream<R: Read + Seek>(reader: &mut R) -> Result<Digest, CasError> {
    reader.seek(SeekFrom::Start(0))?;

    let mut state = Xxh3::new();
    let mut block = [0u8; STREAM_BLOCK_SIZE];
    loop {
        let n = match reader.read(&mut block) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        state.update(&block[..n]);
    }
    Ok(Digest::from(state.digest()))
}

/// Open a file and fingerprint its full contents.
pub fn digest_file(path: &Path) -> Result<Digest, CasError> {
    let mut file = File::open(path).map_err(|source| CasError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    digest_stream(&mut file)
}
