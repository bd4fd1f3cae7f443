//! Seeding: chunk local files into the store and index ahead of any receive.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ferry_cas::CasError;
use ferry_types::{Digest, Manifest};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::EngineError;
use crate::node::{FerryNode, index_path};

/// Totals for one seeding run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub files: usize,
    pub chunks: usize,
    pub bytes: u64,
    pub rows_inserted: usize,
    /// Empty files that were passed over.
    pub skipped: usize,
}

pub(crate) fn seed_file(node: &FerryNode, path: &Path) -> Result<Manifest, EngineError> {
    seed_one(node, path).map(|(manifest, _)| manifest)
}

/// Store every distinct chunk of `path` and record its locations. Returns
/// the manifest and the number of new index rows.
fn seed_one(node: &FerryNode, path: &Path) -> Result<(Manifest, usize), EngineError> {
    let key = index_path(path)?;
    let store = node.store();
    let mut stored: HashSet<Digest> = HashSet::new();

    let manifest = node.chunker().chunk_file_with(
        path,
        node.config().source_id,
        |chunk, bytes| -> Result<(), EngineError> {
            if stored.insert(chunk.digest) {
                store.put(chunk.digest, bytes)?;
            }
            Ok(())
        },
    )?;

    let rows = node.meta().insert_chunks(&manifest, &key)?;
    debug!(path = %key, chunks = manifest.chunk_count(), rows, "seeded file");
    Ok((manifest, rows))
}

pub(crate) fn seed_paths(node: &FerryNode, paths: &[PathBuf]) -> Result<SeedReport, EngineError> {
    let mut report = SeedReport::default();
    for root in paths {
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            match seed_one(node, path) {
                Ok((manifest, rows)) => {
                    report.files += 1;
                    report.chunks += manifest.chunk_count();
                    report.bytes += manifest.file_size;
                    report.rows_inserted += rows;
                }
                Err(EngineError::Cas(CasError::EmptyFile(_))) => {
                    warn!(path = %path.display(), "skipping empty file");
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
    info!(
        files = report.files,
        chunks = report.chunks,
        bytes = report.bytes,
        rows = report.rows_inserted,
        skipped = report.skipped,
        "seeding complete"
    );
    Ok(report)
}
