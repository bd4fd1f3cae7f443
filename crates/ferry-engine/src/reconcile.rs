//! Chunk availability reconciliation.
//!
//! Every distinct digest in a manifest starts out [`ChunkState::Unknown`] and
//! is resolved in three passes: an intact blob already in the chunk store
//! makes it local; a readable, matching range of another indexed file makes
//! it scavenged; anything left is remote and queued for download. Nothing is
//! queued until the first two passes have covered the whole manifest.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use ferry_meta::MetaIndex;
use ferry_net::ChunkRequest;
use ferry_store::{BlobStatus, ChunkStore};
use ferry_types::{Digest, IndexRecord, Manifest};
use tracing::{debug, warn};

use crate::error::EngineError;

/// Resolution state of one manifest chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkState {
    Unknown,
    /// An intact blob was already in the store.
    Local,
    /// Recovered from another local file and written into the store.
    Scavenged,
    /// Must be fetched from the peer.
    Remote,
}

/// Which digests of one manifest are still unresolved.
#[derive(Debug, Clone, Default)]
pub struct MissingSet {
    entries: HashMap<Digest, bool>,
}

impl MissingSet {
    /// Every digest of the manifest, all marked missing.
    pub fn for_manifest(manifest: &Manifest) -> Self {
        let entries = manifest.chunks.iter().map(|c| (c.digest, true)).collect();
        Self { entries }
    }

    /// True if `digest` belongs to the manifest and is not yet resolved.
    pub fn is_missing(&self, digest: Digest) -> bool {
        self.entries.get(&digest).copied().unwrap_or(false)
    }

    /// Mark a digest resolved. Returns true if it was missing.
    pub fn resolve(&mut self, digest: Digest) -> bool {
        match self.entries.get_mut(&digest) {
            Some(missing) if *missing => {
                *missing = false;
                true
            }
            _ => false,
        }
    }

    /// Unresolved digests in ascending order.
    pub fn missing_digests(&self) -> Vec<Digest> {
        let mut digests: Vec<Digest> = self
            .entries
            .iter()
            .filter(|&(_, &missing)| missing)
            .map(|(&d, _)| d)
            .collect();
        digests.sort_unstable();
        digests
    }

    pub fn remaining(&self) -> usize {
        self.entries.values().filter(|&&missing| missing).count()
    }

    /// True once every digest is resolved.
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }
}

/// Outcome of reconciling one manifest.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// State of every manifest chunk, by sequence index.
    pub states: Vec<ChunkState>,
    /// Digests still to be downloaded.
    pub missing: MissingSet,
    /// One request per distinct remote digest, at its first index.
    pub downloads: VecDeque<ChunkRequest>,
}

impl Reconciliation {
    /// Number of manifest chunks in the given state.
    pub fn count(&self, state: ChunkState) -> usize {
        self.states.iter().filter(|&&s| s == state).count()
    }
}

/// Classify every chunk of `manifest`, scavenging what can be scavenged.
pub fn reconcile(
    store: &dyn ChunkStore,
    meta: &MetaIndex,
    manifest: &Manifest,
) -> Result<Reconciliation, EngineError> {
    let mut missing = MissingSet::for_manifest(manifest);
    let mut resolved: HashMap<Digest, ChunkState> = HashMap::new();

    check_local(store, manifest, &mut missing, &mut resolved)?;
    scavenge(store, meta, manifest, &mut missing, &mut resolved)?;

    let mut downloads = VecDeque::new();
    for (index, chunk) in manifest.chunks.iter().enumerate() {
        if missing.is_missing(chunk.digest) && !resolved.contains_key(&chunk.digest) {
            resolved.insert(chunk.digest, ChunkState::Remote);
            downloads.push_back(ChunkRequest {
                digest: chunk.digest,
                index: index as u64,
            });
        }
    }

    let states = manifest
        .chunks
        .iter()
        .map(|c| resolved.get(&c.digest).copied().unwrap_or(ChunkState::Unknown))
        .collect();
    let reconciliation = Reconciliation {
        states,
        missing,
        downloads,
    };

    debug!(
        file_name = %manifest.file_name,
        chunks = manifest.chunk_count(),
        local = reconciliation.count(ChunkState::Local),
        scavenged = reconciliation.count(ChunkState::Scavenged),
        remote = reconciliation.count(ChunkState::Remote),
        "reconciled manifest"
    );
    Ok(reconciliation)
}

fn check_local(
    store: &dyn ChunkStore,
    manifest: &Manifest,
    missing: &mut MissingSet,
    resolved: &mut HashMap<Digest, ChunkState>,
) -> Result<(), EngineError> {
    for chunk in &manifest.chunks {
        if !missing.is_missing(chunk.digest) || resolved.contains_key(&chunk.digest) {
            continue;
        }
        match store.check(chunk.digest)? {
            BlobStatus::Valid => {
                missing.resolve(chunk.digest);
                resolved.insert(chunk.digest, ChunkState::Local);
            }
            BlobStatus::Corrupt { actual } => {
                warn!(
                    expected = %chunk.digest,
                    %actual,
                    "stored blob does not match its digest; not using it"
                );
            }
            BlobStatus::Missing => {}
        }
    }
    Ok(())
}

/// One place a wanted chunk was seen before.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    digest: Digest,
    cutpoint: u64,
    size: u64,
}

/// Candidates grouped by source file, so each file is opened once.
fn cutpoint_map(records: Vec<IndexRecord>) -> BTreeMap<String, Vec<Candidate>> {
    let mut map: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();
    for record in records {
        map.entry(record.file_path).or_default().push(Candidate {
            digest: record.digest,
            cutpoint: record.cutpoint,
            size: record.size,
        });
    }
    map
}

fn scavenge(
    store: &dyn ChunkStore,
    meta: &MetaIndex,
    manifest: &Manifest,
    missing: &mut MissingSet,
    resolved: &mut HashMap<Digest, ChunkState>,
) -> Result<(), EngineError> {
    let wanted = missing.missing_digests();
    if wanted.is_empty() {
        return Ok(());
    }

    let expected_size: HashMap<Digest, u64> =
        manifest.chunks.iter().map(|c| (c.digest, c.size)).collect();
    let groups = cutpoint_map(meta.find_chunks(&wanted)?);
    let mut buf = Vec::new();

    for (path, candidates) in groups {
        if !candidates.iter().any(|c| missing.is_missing(c.digest)) {
            continue;
        }
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path, error = %e, "cannot open scavenge source; skipping it");
                continue;
            }
        };

        for candidate in candidates {
            if !missing.is_missing(candidate.digest) {
                continue;
            }
            if expected_size.get(&candidate.digest) != Some(&candidate.size) {
                warn!(
                    path,
                    digest = %candidate.digest,
                    size = candidate.size,
                    "index record size disagrees with manifest; skipping it"
                );
                continue;
            }
            if let Err(e) = read_range(&mut file, candidate.cutpoint, candidate.size, &mut buf)? {
                warn!(
                    path,
                    cutpoint = candidate.cutpoint,
                    error = %e,
                    "cannot read scavenge candidate; skipping it"
                );
                continue;
            }

            let actual = Digest::from_data(&buf);
            if actual != candidate.digest {
                warn!(
                    path,
                    cutpoint = candidate.cutpoint,
                    expected = %candidate.digest,
                    %actual,
                    "scavenge candidate is stale; skipping it"
                );
                continue;
            }

            store.put(candidate.digest, &buf)?;
            missing.resolve(candidate.digest);
            resolved.insert(candidate.digest, ChunkState::Scavenged);
            debug!(path, cutpoint = candidate.cutpoint, digest = %candidate.digest, "scavenged chunk");
        }
    }
    Ok(())
}

/// Read `size` bytes at `offset` into `buf`.
///
/// The outer error is fatal (allocation); the inner one is a per-candidate
/// read failure the caller may skip.
fn read_range(
    file: &mut File,
    offset: u64,
    size: u64,
    buf: &mut Vec<u8>,
) -> Result<std::io::Result<()>, EngineError> {
    let len = usize::try_from(size).map_err(|_| EngineError::Allocation(usize::MAX))?;
    buf.clear();
    buf.try_reserve_exact(len)
        .map_err(|_| EngineError::Allocation(len))?;
    buf.resize(len, 0);
    Ok(file
        .seek(SeekFrom::Start(offset))
        .and_then(|_| file.read_exact(buf)))
}
