//! The memory repository boundary.
//!
//! The repository is the only component that touches persistent storage and
//! the only shared-mutable resource in the core. It owns per-record
//! read-modify-write atomicity; callers receive value snapshots and route
//! every mutation back through these operations.
//!
//! Two implementations ship with the crate: [`SqliteRepository`] (the
//! durable reference implementation) and [`InMemoryRepository`] (tests and
//! ephemeral deployments).

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;

use crate::config::BankConfig;
use crate::error::{BankError, Result};
use crate::record::{validate_embedding, MemoryDraft, MemoryRecord};
use crate::types::{Embedding, MemoryCategory, MemoryId, MemorySource, MemoryStatus};

/// Practical cap on the rows examined by a single brute-force retrieval.
pub(crate) const RETRIEVAL_SCAN_CAP: usize = 10_000;

/// Open the repository backend named by the configuration.
///
/// `"sqlite"` requires a database path; `"memory"` ignores it.
///
/// # Errors
///
/// Returns [`BankError::Config`] for an unknown backend or a missing SQLite
/// path, and [`BankError::Database`] if the database cannot be opened.
pub fn open_repository(
    config: &BankConfig,
    db_path: Option<&Path>,
) -> Result<Arc<dyn MemoryRepository>> {
    let dims = config.embedding.dimensions;
    match config.persistence.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryRepository::new(dims))),
        "sqlite" => {
            let path = db_path.ok_or_else(|| {
                BankError::Config("sqlite backend requires a database path".to_string())
            })?;
            Ok(Arc::new(SqliteRepository::open(
                path,
                dims,
                &config.persistence,
            )?))
        }
        other => Err(BankError::Config(format!(
            "unknown persistence backend: '{other}'"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Filter & patch shapes
// ---------------------------------------------------------------------------

/// Filters applied during similarity retrieval.
#[derive(Debug, Clone, Default)]
pub struct RetrievalFilter {
    /// Admit records with `success_rate >= threshold` — or no recorded rate
    /// yet, so new records are not punished.
    pub min_success_rate: Option<f64>,
    /// Inclusion set of categories; `None` means no category filter.
    pub categories: Option<Vec<MemoryCategory>>,
}

impl RetrievalFilter {
    /// Whether a record passes this filter.
    #[must_use]
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if let Some(threshold) = self.min_success_rate {
            match record.success_rate {
                Some(rate) if rate < threshold => return false,
                _ => {}
            }
        }
        if let Some(categories) = &self.categories {
            if !categories.contains(&record.category) {
                return false;
            }
        }
        true
    }
}

/// Partial fields for `update`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    /// Replacement title.
    pub title: Option<String>,
    /// Replacement description.
    pub description: Option<String>,
    /// Replacement content.
    pub content: Option<String>,
    /// Replacement category.
    pub category: Option<MemoryCategory>,
    /// Replacement source.
    pub source: Option<MemorySource>,
    /// Replacement embedding (validated against D).
    pub embedding: Option<Embedding>,
    /// Replacement status. Only `Active → Archived` is permitted.
    pub status: Option<MemoryStatus>,
    /// Replacement retrieval counter (merge folds).
    pub times_retrieved: Option<u64>,
    /// Replacement success counter (merge folds).
    pub times_used_in_success: Option<u64>,
    /// Replacement failure counter (merge folds).
    pub times_used_in_failure: Option<u64>,
}

/// Apply a patch to a record snapshot, enforcing validation and the one-way
/// status transition. Recomputes the success rate when a counter changes and
/// bumps `updated_at`.
///
/// # Errors
///
/// Returns [`BankError::InvalidRecord`] / [`BankError::InvalidEmbedding`]
/// when the patched record would be invalid.
pub(crate) fn apply_patch(
    record: &mut MemoryRecord,
    patch: RecordPatch,
    dimensions: usize,
    now: DateTime<Utc>,
) -> Result<()> {
    if let Some(embedding) = patch.embedding {
        validate_embedding(&embedding, dimensions)?;
        record.embedding = embedding;
    }
    if let Some(title) = patch.title {
        if title.trim().is_empty() {
            return Err(BankError::InvalidRecord("title is required".to_string()));
        }
        record.title = title;
    }
    if let Some(description) = patch.description {
        if description.trim().is_empty() {
            return Err(BankError::InvalidRecord(
                "description is required".to_string(),
            ));
        }
        record.description = description;
    }
    if let Some(content) = patch.content {
        if content.trim().is_empty() {
            return Err(BankError::InvalidRecord("content is required".to_string()));
        }
        record.content = content;
    }
    if let Some(category) = patch.category {
        record.category = category;
    }
    if let Some(source) = patch.source {
        record.source = source;
    }
    if let Some(status) = patch.status {
        if record.status == MemoryStatus::Archived && status == MemoryStatus::Active {
            return Err(BankError::InvalidRecord(
                "archived records cannot be reactivated".to_string(),
            ));
        }
        record.status = status;
    }

    let counters_touched = patch.times_retrieved.is_some()
        || patch.times_used_in_success.is_some()
        || patch.times_used_in_failure.is_some();
    if let Some(n) = patch.times_retrieved {
        record.times_retrieved = n;
    }
    if let Some(n) = patch.times_used_in_success {
        record.times_used_in_success = n;
    }
    if let Some(n) = patch.times_used_in_failure {
        record.times_used_in_failure = n;
    }
    if counters_touched {
        record.recompute_success_rate();
        record.check_stats()?;
    }

    record.updated_at = now;
    Ok(())
}

// ---------------------------------------------------------------------------
// Retrieval ranking
// ---------------------------------------------------------------------------

/// Rank records against a query embedding and keep the top `k`.
///
/// Archived records and records failing the filter are excluded. Ordering is
/// deterministic: similarity descending, then success rate descending with
/// unrated records last, then `updated_at` descending, then id ascending.
pub(crate) fn rank_for_retrieval(
    records: Vec<MemoryRecord>,
    query: &Embedding,
    k: usize,
    filter: &RetrievalFilter,
) -> Vec<MemoryRecord> {
    let mut scored: Vec<(OrderedFloat<f64>, MemoryRecord)> = records
        .into_iter()
        .filter(|r| r.status == MemoryStatus::Active && filter.matches(r))
        .map(|r| (OrderedFloat(query.cosine_similarity(&r.embedding)), r))
        .collect();

    scored.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| success_rate_desc(a.1.success_rate, b.1.success_rate))
            .then_with(|| b.1.updated_at.cmp(&a.1.updated_at))
            .then_with(|| a.1.id.to_string().cmp(&b.1.id.to_string()))
    });

    scored.truncate(k);
    scored.into_iter().map(|(_, r)| r).collect()
}

/// Comparator fragment: higher success rates first, unrated records last.
fn success_rate_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => OrderedFloat(y).cmp(&OrderedFloat(x)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// CRUD, bulk scan, similarity retrieval, and statistics updates over the
/// memory store.
///
/// Implementations provide linearizable per-id updates; the core never
/// assumes cross-id transactions.
#[async_trait]
pub trait MemoryRepository: Send + Sync {
    /// Validate and insert a new record; returns the assigned id.
    ///
    /// # Errors
    ///
    /// `InvalidRecord` / `InvalidEmbedding` on validation failure,
    /// `StoreUnavailable` / `Database` on storage failure.
    async fn add(&self, draft: MemoryDraft) -> Result<MemoryId>;

    /// Fetch a record snapshot by id, or `None` when absent.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` / `Database` on storage failure.
    async fn get(&self, id: &MemoryId) -> Result<Option<MemoryRecord>>;

    /// Apply a partial update and return the new snapshot.
    ///
    /// # Errors
    ///
    /// `NotFound` when the id is unknown; `InvalidRecord` /
    /// `InvalidEmbedding` when the patch fails validation.
    async fn update(&self, id: &MemoryId, patch: RecordPatch) -> Result<MemoryRecord>;

    /// Hard-delete a record.
    ///
    /// # Errors
    ///
    /// `NotFound` when the id is unknown.
    async fn delete(&self, id: &MemoryId) -> Result<()>;

    /// Transition a record to `Archived` (one-way; idempotent).
    ///
    /// # Errors
    ///
    /// `NotFound` when the id is unknown.
    async fn archive(&self, id: &MemoryId) -> Result<()>;

    /// Return up to `limit` active record snapshots in a stable order.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` / `Database` on storage failure.
    async fn scan_all(&self, limit: usize) -> Result<Vec<MemoryRecord>>;

    /// Return up to `k` records ordered by decreasing similarity to `query`,
    /// excluding archived records and applying `filter`.
    ///
    /// Each selected record's `times_retrieved` is incremented and its
    /// `updated_at` bumped before the snapshots are returned (at-least-once
    /// semantics).
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` / `Database` on storage failure.
    async fn retrieve_by_embedding(
        &self,
        query: &Embedding,
        k: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<MemoryRecord>>;

    /// Record a success/failure outcome against each listed record and
    /// recompute its rate. Unknown ids are logged and skipped, never fatal.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` / `Database` on storage failure.
    async fn update_stats(&self, ids: &[MemoryId], succeeded: bool) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
