//! [`MetaIndex`] implementation over a single SQLite connection.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use ferry_types::{Digest, IndexRecord, Manifest};
use parking_lot::Mutex;
use rusqlite::{Connection, Row, TransactionBehavior, params};
use tracing::debug;

use crate::MetaError;

type Result<T> = std::result::Result<T, MetaError>;

/// How long a writer waits on a database locked by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Chunk location index.
///
/// Digests are stored bit-for-bit as signed 64-bit integers.
pub struct MetaIndex {
    conn: Mutex<Connection>,
}

impl MetaIndex {
    /// Open or create the index database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Self::init(conn)
    }

    /// Open a private in-memory index that vanishes on drop.
    ///
    /// Useful for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ferry_chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chunk_checksum INTEGER NOT NULL,
                cutpoint INTEGER NOT NULL,
                chunk_size INTEGER NOT NULL,
                file_path TEXT NOT NULL,
                UNIQUE (chunk_checksum, cutpoint, chunk_size, file_path)
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ----- Scavenging -----

    /// Return every record whose digest is in `candidates`.
    ///
    /// Candidates are loaded into a temporary table and joined in one query.
    /// Results are ordered by file path, then cutpoint.
    pub fn find_chunks(&self, candidates: &[Digest]) -> Result<Vec<IndexRecord>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "CREATE TEMP TABLE IF NOT EXISTS candidate_chunks (
                chunk_checksum INTEGER PRIMARY KEY
            )",
            [],
        )?;
        tx.execute("DELETE FROM candidate_chunks", [])?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT OR IGNORE INTO candidate_chunks (chunk_checksum) VALUES (?1)",
            )?;
            for digest in candidates {
                insert.execute([digest_to_sql(*digest)])?;
            }
        }

        let records = {
            let mut stmt = tx.prepare_cached(
                "SELECT c.chunk_checksum, c.cutpoint, c.chunk_size, c.file_path
                 FROM ferry_chunks c
                 JOIN candidate_chunks k ON k.chunk_checksum = c.chunk_checksum
                 ORDER BY c.file_path, c.cutpoint",
            )?;
            let rows = stmt.query_map([], record_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        tx.execute("DELETE FROM candidate_chunks", [])?;
        tx.commit()?;

        debug!(
            candidates = candidates.len(),
            hits = records.len(),
            "queried index for candidate chunks"
        );
        Ok(records)
    }

    // ----- Commit -----

    /// Record every chunk of `manifest` as living in `file_path`.
    ///
    /// A digest repeated within the manifest is recorded once, at its first
    /// occurrence. Tuples already present are left alone. The batch is one
    /// transaction. Returns the number of rows inserted.
    pub fn insert_chunks(&self, manifest: &Manifest, file_path: &str) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut seen = HashSet::with_capacity(manifest.chunks.len());
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO ferry_chunks (chunk_checksum, cutpoint, chunk_size, file_path)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for chunk in &manifest.chunks {
                if !seen.insert(chunk.digest) {
                    continue;
                }
                inserted += stmt.execute(params![
                    digest_to_sql(chunk.digest),
                    u64_to_sql("cutpoint", chunk.cutpoint)?,
                    u64_to_sql("chunk_size", chunk.size)?,
                    file_path,
                ])?;
            }
        }
        tx.commit()?;

        debug!(file_path, chunks = manifest.chunks.len(), inserted, "committed chunk locations");
        Ok(inserted)
    }

    // ----- Garbage collection -----

    /// Every `(digest, file_path)` pair in the index, ordered by digest.
    pub fn list_all(&self) -> Result<Vec<(Digest, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT chunk_checksum, file_path FROM ferry_chunks ORDER BY chunk_checksum, file_path",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((digest_from_sql(row.get(0)?), row.get::<_, String>(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Delete every row for the given digests. Returns the number of rows removed.
    pub fn delete(&self, digests: &[Digest]) -> Result<usize> {
        if digests.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM ferry_chunks WHERE chunk_checksum = ?1")?;
            for digest in digests {
                removed += stmt.execute([digest_to_sql(*digest)])?;
            }
        }
        tx.commit()?;

        debug!(digests = digests.len(), removed, "deleted index rows");
        Ok(removed)
    }

    // ----- Status -----

    /// Records for a single file, in cutpoint order.
    pub fn records_for_file(&self, file_path: &str) -> Result<Vec<IndexRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT chunk_checksum, cutpoint, chunk_size, file_path
             FROM ferry_chunks WHERE file_path = ?1 ORDER BY cutpoint",
        )?;
        let rows = stmt.query_map([file_path], record_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Total number of rows.
    pub fn row_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ferry_chunks", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn digest_to_sql(digest: Digest) -> i64 {
    digest.as_u64() as i64
}

fn digest_from_sql(value: i64) -> Digest {
    Digest::from(value as u64)
}

fn u64_to_sql(field: &'static str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| MetaError::OutOfRange { field, value })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<IndexRecord> {
    let non_negative = |idx: usize| -> rusqlite::Result<u64> {
        let value: i64 = row.get(idx)?;
        u64::try_from(value).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, value))
    };
    Ok(IndexRecord {
        digest: digest_from_sql(row.get(0)?),
        cutpoint: non_negative(1)?,
        size: non_negative(2)?,
        file_path: row.get(3)?,
    })
}
