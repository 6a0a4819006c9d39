//! In-memory repository backend.
//!
//! Backs tests and the `memory` persistence backend: a `RwLock` over an
//! ordered map, with the same validation, ordering, and statistics semantics
//! as the SQLite implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{BankError, Result};
use crate::metrics::BankCounters;
use crate::record::{MemoryDraft, MemoryRecord};
use crate::repository::{
    apply_patch, rank_for_retrieval, MemoryRepository, RecordPatch, RetrievalFilter,
};
use crate::types::{Embedding, MemoryId, MemoryStatus};

/// A repository holding all records in process memory.
pub struct InMemoryRepository {
    dims: usize,
    records: RwLock<BTreeMap<MemoryId, MemoryRecord>>,
    counters: Arc<BankCounters>,
}

impl InMemoryRepository {
    /// Create an empty repository expecting embeddings of `dimensions`.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dims: dimensions,
            records: RwLock::new(BTreeMap::new()),
            counters: Arc::new(BankCounters::new()),
        }
    }

    /// Share a counter set with the rest of the process.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<BankCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Number of records currently stored, regardless of status.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the repository holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Insert a fully-formed record snapshot, keeping its id, statistics,
    /// and timestamps. Restore/import path; normal writes go through `add`.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the snapshot violates the embedding
    /// or statistics invariants.
    pub fn insert_snapshot(&self, record: MemoryRecord) -> Result<()> {
        crate::record::validate_embedding(&record.embedding, self.dims)?;
        record.check_stats()?;
        self.records.write().insert(record.id, record);
        Ok(())
    }
}

#[async_trait]
impl MemoryRepository for InMemoryRepository {
    async fn add(&self, draft: MemoryDraft) -> Result<MemoryId> {
        draft.validate(self.dims)?;
        let id = MemoryId::new();
        let record = MemoryRecord::from_draft(id, draft, Utc::now());
        self.records.write().insert(id, record);
        debug!(%id, "memory record added");
        Ok(id)
    }

    async fn get(&self, id: &MemoryId) -> Result<Option<MemoryRecord>> {
        Ok(self.records.read().get(id).cloned())
    }

    async fn update(&self, id: &MemoryId, patch: RecordPatch) -> Result<MemoryRecord> {
        let mut records = self.records.write();
        let record = records.get_mut(id).ok_or(BankError::NotFound(*id))?;
        apply_patch(record, patch, self.dims, Utc::now())?;
        Ok(record.clone())
    }

    async fn delete(&self, id: &MemoryId) -> Result<()> {
        self.records
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or(BankError::NotFound(*id))
    }

    async fn archive(&self, id: &MemoryId) -> Result<()> {
        let mut records = self.records.write();
        let record = records.get_mut(id).ok_or(BankError::NotFound(*id))?;
        record.status = MemoryStatus::Archived;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn scan_all(&self, limit: usize) -> Result<Vec<MemoryRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.status == MemoryStatus::Active)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn retrieve_by_embedding(
        &self,
        query: &Embedding,
        k: usize,
        filter: &RetrievalFilter,
    ) -> Result<Vec<MemoryRecord>> {
        let candidates: Vec<MemoryRecord> =
            self.records.read().values().cloned().collect();
        let selected = rank_for_retrieval(candidates, query, k, filter);

        let now = Utc::now();
        let mut records = self.records.write();
        let mut snapshots = Vec::with_capacity(selected.len());
        for hit in selected {
            if let Some(stored) = records.get_mut(&hit.id) {
                stored.mark_retrieved(now);
                snapshots.push(stored.clone());
            }
        }
        debug!(returned = snapshots.len(), k, "similarity retrieval");
        Ok(snapshots)
    }

    async fn update_stats(&self, ids: &[MemoryId], succeeded: bool) -> Result<()> {
        let now = Utc::now();
        let mut records = self.records.write();
        for id in ids {
            match records.get_mut(id) {
                Some(record) => {
                    record.record_outcome(succeeded, now);
                    BankCounters::bump(&self.counters.stat_updates);
                }
                None => warn!(%id, "stat update for unknown record, skipping"),
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
