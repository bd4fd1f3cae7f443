//! Garbage collection of chunks no surviving file references.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use ferry_meta::MetaIndex;
use ferry_store::ChunkStore;
use ferry_types::Digest;
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Outcome of one garbage collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Distinct digests found in the index.
    pub digests_examined: usize,
    /// Digests whose blob and index rows were removed.
    pub digests_removed: usize,
    /// Blobs actually deleted; a digest may have had no blob.
    pub blobs_deleted: usize,
    pub rows_deleted: usize,
}

/// Remove every digest none of whose indexed files still exist.
///
/// A digest stays alive as long as one of its files exists. A blob that is
/// already gone is not an error. A blob that cannot be deleted keeps its
/// index rows so a later pass can retry.
pub fn collect_garbage(store: &dyn ChunkStore, meta: &MetaIndex) -> Result<GcReport, EngineError> {
    let mut referenced: BTreeMap<Digest, Vec<String>> = BTreeMap::new();
    for (digest, path) in meta.list_all()? {
        referenced.entry(digest).or_default().push(path);
    }

    let mut exists: HashMap<String, bool> = HashMap::new();
    let mut report = GcReport {
        digests_examined: referenced.len(),
        ..GcReport::default()
    };
    let mut removed = Vec::new();

    for (digest, paths) in referenced {
        let live = paths.iter().any(|path| {
            *exists
                .entry(path.clone())
                .or_insert_with(|| path_exists(path))
        });
        if live {
            continue;
        }

        match store.delete(digest) {
            Ok(true) => report.blobs_deleted += 1,
            Ok(false) => debug!(%digest, "blob already absent"),
            Err(e) => {
                warn!(%digest, error = %e, "cannot delete blob; keeping its index rows");
                continue;
            }
        }
        removed.push(digest);
    }

    report.digests_removed = removed.len();
    if !removed.is_empty() {
        report.rows_deleted = meta.delete(&removed)?;
    }
    info!(
        examined = report.digests_examined,
        removed = report.digests_removed,
        blobs = report.blobs_deleted,
        rows = report.rows_deleted,
        "garbage collection complete"
    );
    Ok(report)
}

/// Indexed digests with no blob in the store, in digest order.
///
/// Such digests still resolve through scavenging or download, so this is a
/// health report rather than an error.
pub fn missing_blobs(store: &dyn ChunkStore, meta: &MetaIndex) -> Result<Vec<Digest>, EngineError> {
    let mut digests: Vec<Digest> = meta.list_all()?.into_iter().map(|(d, _)| d).collect();
    digests.sort();
    digests.dedup();

    let mut missing = Vec::new();
    for digest in digests {
        if !store.contains(digest)? {
            missing.push(digest);
        }
    }
    Ok(missing)
}

/// Whether an indexed file is still present. Anything but a clean "not
/// found" counts as present.
fn path_exists(path: &str) -> bool {
    match Path::new(path).try_exists() {
        Ok(found) => found,
        Err(e) => {
            warn!(path, error = %e, "cannot stat indexed file; treating it as present");
            true
        }
    }
}
