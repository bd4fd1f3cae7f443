//! File-based chunk storage backend.
//!
//! Stores one file per chunk directly under the base directory, named by the
//! digest as 16 lowercase hex digits: `{base_dir}/{hex}`.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use ferry_types::Digest;
use tracing::{debug, error};

use crate::error::StoreError;
use crate::traits::{BlobStatus, ChunkStore};

/// Flat-directory chunk store.
///
/// Writes are atomic: each put stages its bytes in a uniquely named temp file
/// in the base directory and renames it into place, so concurrent writers of
/// one digest never share a staging file and a reader never opens a
/// half-written blob.
#[derive(Debug)]
pub struct FileChunkStore {
    base_dir: PathBuf,
}

impl FileChunkStore {
    /// Open a store rooted at the given directory, creating it if needed.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the blob file for a digest.
    pub fn blob_path(&self, digest: Digest) -> PathBuf {
        self.base_dir.join(digest.to_string())
    }
}

impl ChunkStore for FileChunkStore {
    fn put(&self, digest: Digest, data: &[u8]) -> Result<(), StoreError> {
        let actual = Digest::from_data(data);
        if actual != digest {
            return Err(StoreError::DigestMismatch {
                expected: digest,
                actual,
            });
        }

        let path = self.blob_path(digest);
        let mut staged = tempfile::Builder::new()
            .prefix(".ferry-")
            .suffix(".tmp")
            .tempfile_in(&self.base_dir)?;
        staged.write_all(data)?;
        staged.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!(%digest, path = %path.display(), size = data.len(), "stored chunk blob");
        Ok(())
    }

    fn get(&self, digest: Digest) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.blob_path(digest);
        match fs::read(&path) {
            Ok(data) => {
                let actual = Digest::from_data(&data);
                if actual != digest {
                    error!(expected = %digest, %actual, "chunk corruption detected on read");
                    return Err(StoreError::Corrupt {
                        expected: digest,
                        actual,
                    });
                }
                Ok(Some(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn check(&self, digest: Digest) -> Result<BlobStatus, StoreError> {
        let path = self.blob_path(digest);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BlobStatus::Missing),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let actual = ferry_cas::digest_stream(&mut file)?;
        if actual == digest {
            Ok(BlobStatus::Valid)
        } else {
            Ok(BlobStatus::Corrupt { actual })
        }
    }

    fn delete(&self, digest: Digest) -> Result<bool, StoreError> {
        let path = self.blob_path(digest);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(%digest, "deleted chunk blob");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn contains(&self, digest: Digest) -> Result<bool, StoreError> {
        match fs::metadata(self.blob_path(digest)) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn list(&self) -> Result<Vec<Digest>, StoreError> {
        let mut digests = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            // Staged `.ferry-*.tmp` files and anything foreign fail to parse.
            if let Some(name) = entry.file_name().to_str()
                && let Ok(digest) = name.parse::<Digest>()
                && name == digest.to_string()
            {
                digests.push(digest);
            }
        }
        Ok(digests)
    }
}
