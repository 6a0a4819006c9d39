//! SQLite repository backend — the durable reference implementation.
//!
//! One row per [`MemoryRecord`] in a single `memories` table. The embedding
//! is stored as a JSON BLOB, which keeps the schema stable if the
//! dimensionality changes between deployments; enum fields are stored as
//! their snake_case strings; timestamps as RFC 3339 text.
//!
//! WAL mode allows concurrent readers while the maintenance passes write.
//! The connection sits behind a mutex, which is what gives `update` and
//! `update_stats` their per-record read-modify-write atomicity.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{BankError, Result};
use crate::metrics::BankCounters;
use crate::record::{MemoryDraft, MemoryRecord};
use crate::repository::{
    apply_patch, rank_for_retrieval, MemoryRepository, RecordPatch, RetrievalFilter,
    RETRIEVAL_SCAN_CAP,
};
use crate::types::{Embedding, MemoryId};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS memories (
    id                     TEXT PRIMARY KEY,
    title                  TEXT NOT NULL,
    description            TEXT NOT NULL,
    content                TEXT NOT NULL,
    category               TEXT NOT NULL,
    source                 TEXT NOT NULL,
    embedding              BLOB NOT NULL,
    times_retrieved        INTEGER NOT NULL DEFAULT 0,
    times_used_in_success  INTEGER NOT NULL DEFAULT 0,
    times_used_in_failure  INTEGER NOT NULL DEFAULT 0,
    success_rate           REAL,
    status                 TEXT NOT NULL DEFAULT 'active',
    created_at             TEXT NOT NULL,
    updated_at             TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memories_status ON memories(status);";

/// Raw column values for one row, decoded outside the rusqlite closure so
/// conversion failures map onto crate errors instead of SQLite ones.
type RawRow = (
    String,         // id
    String,         // title
    String,         // description
    String,         // content
    String,         // category
    String,         // source
    Vec<u8>,        // embedding (JSON)
    i64,            // times_retrieved
    i64,            // times_used_in_success
    i64,            // times_used_in_failure
    Option<f64>,    // success_rate
    String,         // status
    String,         // created_at
    String,         // updated_at
);

const SELECT_COLUMNS: &str = "id, title, description, content, category, source, embedding, \
     times_retrieved, times_used_in_success, times_used_in_failure, \
     success_rate, status, created_at, updated_at";

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
        row.get(12)?,
        row.get(13)?,
    ))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BankError::Serialization(format!("bad timestamp '{s}': {e}")))
}

#[allow(clippy::cast_sign_loss)]
fn decode_row(raw: RawRow) -> Result<MemoryRecord> {
    let (
        id,
        title,
        description,
        content,
        category,
        source,
        embedding,
        times_retrieved,
        times_used_in_success,
        times_used_in_failure,
        success_rate,
        status,
        created_at,
        updated_at,
    ) = raw;

    let embedding: Vec<f32> = serde_json::from_slice(&embedding)
        .map_err(|e| BankError::Serialization(format!("bad embedding blob: {e}")))?;

    Ok(MemoryRecord {
        id: id
            .parse()
            .map_err(|e| BankError::Serialization(format!("bad record id '{id}': {e}")))?,
        title,
        description,
        content,
        category: category
            .parse()
            .map_err(BankError::Serialization)?,
        source: source.parse().map_err(BankError::Serialization)?,
        embedding: Embedding(embedding),
        times_retrieved: times_retrieved as u64,
        times_used_in_success: times_used_in_success as u64,
        times_used_in_failure: times_used_in_failure as u64,
        success_rate,
        status: status.parse().map_err(BankError::Serialization)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

// ---------------------------------------------------------------------------
// SqliteRepository
// ---------------------------------------------------------------------------

/// Repository backed by a SQLite database file.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
    dims: usize,
    db_path: PathBuf,
    counters: Arc<BankCounters>,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository")
            .field("db_path", &self.db_path)
            .field("dims", &self.dims)
            .finish_non_exhaustive()
    }
}

impl SqliteRepository {
    /// Open (or create) a database at `path`, creating the schema as needed.
    ///
    /// # Errors
    ///
    /// Returns [`BankError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(
        path: P,
        dimensions: usize,
        config: &PersistenceConfig,
    ) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            dims = dimensions,
            "memory repository opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            dims: dimensions,
            db_path,
            counters: Arc::new(BankCounters::new()),
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`BankError::Database`] on SQLite failures.
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dims: dimensions,
            db_path: PathBuf::from(":memory:"),
            counters: Arc::new(BankCounters::new()),
        })
    }

    /// Share a counter set with the rest of the process.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<BankCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Path to the database file (`:memory:` for in-memory databases).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Insert a fully-formed record snapshot, keeping its id, statistics,
    /// and timestamps. Restore/import path; normal writes go through `add`.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the snapshot violates the embedding
    /// or statistics invariants, or [`BankError::Database`] on SQLite
    /// failures.
    pub fn insert_snapshot(&self, record: &MemoryRecord) -> Result<()> {
        crate::record::validate_embedding(&record.embedding, self.dims)?;
        record.check_stats()?;
        let embedding = serde_json::to_vec(&record.embedding.0)
            .map_err(|e| BankError::Serialization(e.to_string()))?;

        let conn = self.conn.lock();
        #[allow(clippy::cast_possible_wrap)]
        conn.execute(
            "INSERT OR REPLACE INTO memories (
                id, title, description, content, category, source, embedding,
                times_retrieved, times_used_in_success, times_used_in_failure,
                success_rate, status, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                record.id.to_string(),
                record.title,
                record.description,
                record.content,
                record.category.to_string(),
                record.source.to_string(),
                embedding,
                record.times_retrieved as i64,
                record.times_used_in_success as i64,
                record.times_used_in_failure as i64,
                record.success_rate,
                record.status.to_string(),
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn fetch_one(conn: &Connection, id: &MemoryId) -> Result<Option<MemoryRecord>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM memories WHERE id = ?1"
        ))?;
        let raw = match stmt.query_row(params![id.to_string()], read_raw) {
            Ok(raw) => raw,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode_row(raw).map(Some)
    }

    fn write_record(conn: &Connection, record: &MemoryRecord) -> Result<()> {
        let embedding = serde_json::to_vec(&record.embedding.0)
            .map_err(|e| BankError::Serialization(e.to_string()))?;
        #[allow(clippy::cast_possible_wrap)]
        conn.execute(
            "UPDATE memories SET
                title = ?2, description = ?3, content = ?4, category = ?5,
                source = ?6, embedding = ?7, times_retrieved = ?8,
                times_used_in_success = ?9, times_used_in_failure = ?10,
                success_rate = ?11, status = ?12, updated_at = ?13
             WHERE id = ?1",
            params![
                record.id.to_string(),
                record.title,
                record.description,
                record.content,
                record.category.to_string(),
                record.source.to_string(),
                embedding,
                record.times_retrieved as i64,
                record.times_used_in_success as i64,
                record.times_used_in_failure as i64,
                record.success_rate,
                record.status.to_string(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn load_active(conn: &Connection, limit: usize) -> Result<Vec<MemoryRecord>> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM memories WHERE status = 'active'
             ORDER BY created_at ASC, id ASC LIMIT ?1"
        ))?;
        #[allow(clippy::cast_possible_wrap)]
        let rows = stmt.query_map(params![limit as i64], read_raw)?;

        let mut records = Vec::new();
        for row in rows {
            match decode_row(row?) {
                Ok(record) => records.push(record),
                // A single corrupt row must not take down a scan.
                Err(e) => warn!(error = %e, "skipping undecodable row"),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl MemoryRepository for SqliteRepository {
    async fn add(&self, draft: MemoryDraft) -> Result<MemoryId> {
        draft.validate(self.dims)?;
        let id = MemoryId::new();
        let record = MemoryRecord::from_draft(id, draft, Utc::now());
        let embedding = serde_json::to_vec(&record.embedding.0)
            .map_err(|e| BankError::Serialization(e.to_string()))?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO memories (
                id, title, description, content, category, source, embedding,
                times_retrieved, times_used_in_success, times_used_in_failure,
                success_rate, status, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, 0, NULL, 'active', ?8, ?8)",
            params![
                record.id.to_string(),
                record.title,
                record.description,
                record.content,
                record.category.to_string(),
                record.source.to_string(),
                embedding,
                record.created_at.to_rfc3339(),
            ],
        )?;
        debug!(%id, category = %record.category, "memory record added");
        Ok(id)
    }

    async fn get(&self, id: &MemoryId) -> Result<Option<MemoryRecord>> {
        let conn = self.conn.lock();
        Self::fetch_one(&conn, id)
    }

    async fn update(&self, id: &MemoryId, patch: RecordPatch) -> Result<MemoryRecord> {
        let conn = self.conn.lock();
        let mut record = Self::fetch_one(&conn, id)?.ok_or(BankError::NotFound(*id))?;
        apply_patch(&mut record, patch, self.dims, Utc::now())?;
        Self::write_record(&conn, &record)?;
        Ok(record)
    }

    async fn delete(&self, id: &MemoryId) -> Result<()> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM memories WHERE id = ?1",
            params![id.to_string()],
        )?;
        if deleted == 0 {
            return Err(BankError::NotFound(*id));
        }
        Ok(())
    }

    async fn archive(&self, id: &MemoryId) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE memories SET status = 'archived', updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(BankError::NotFound(*id));
        }
        Ok(())
    }

    async fn scan_all(&self, limit: usize) -> Result<Vec<MemoryRecord>> {
        let conn = self.conn.lock();
        Self::load_active(&conn, limit)
    }

    async fn retrieve_by_embedding(
        &self,
        query: &Embedding,
        k: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<MemoryRecord>> {
        let conn = self.conn.lock();
        let candidates = Self::load_active(&conn, RETRIEVAL_SCAN_CAP)?;
        let selected = rank_for_retrieval(candidates, query, k, filter);

        let now = Utc::now();
        let mut snapshots = Vec::with_capacity(selected.len());
        for mut hit in selected {
            conn.execute(
                "UPDATE memories SET times_retrieved = times_retrieved + 1,
                        updated_at = ?2
                 WHERE id = ?1",
                params![hit.id.to_string(), now.to_rfc3339()],
            )?;
            hit.mark_retrieved(now);
            snapshots.push(hit);
        }
        debug!(returned = snapshots.len(), k, "similarity retrieval");
        Ok(snapshots)
    }

    async fn update_stats(&self, ids: &[MemoryId], succeeded: bool) -> Result<()> {
        let conn = self.conn.lock();
        let now = Utc::now();
        for id in ids {
            let Some(mut record) = Self::fetch_one(&conn, id)? else {
                warn!(%id, "stat update for unknown record, skipping");
                continue;
            };
            record.record_outcome(succeeded, now);
            Self::write_record(&conn, &record)?;
            BankCounters::bump(&self.counters.stat_updates);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
