//! Memory consolidation — the periodic maintenance pass.
//!
//! [`ConsolidationEngine::consolidate`] runs three passes strictly in order:
//!
//! 1. **Prune** — delete records that have been retrieved often enough to
//!    judge and keep failing.
//! 2. **Merge** — fold near-duplicate pairs (cosine above the duplicate
//!    threshold) into the stronger twin, summing their statistics.
//! 3. **Archive** — park records nothing has touched in `stale_days`.
//!
//! Pruning first shrinks the O(n²) merge workload; archiving last avoids
//! parking records the earlier passes were about to delete. A single
//! per-record write failure never aborts a pass; only a failed initial scan
//! marks the whole run unsuccessful.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ConsolidationConfig;
use crate::error::BankError;
use crate::metrics::BankCounters;
use crate::record::MemoryRecord;
use crate::repository::{MemoryRepository, RecordPatch};
use crate::types::MemoryId;

/// Outcome summary of one consolidation run.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationStats {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Active records visible to the initial scan.
    pub total_memories_before: usize,
    /// Records hard-deleted by the prune pass.
    pub pruned: usize,
    /// Duplicate pairs folded by the merge pass.
    pub merged: usize,
    /// Records archived by the staleness pass.
    pub archived: usize,
    /// False only when the initial scan failed.
    pub success: bool,
    /// Per-record failures collected along the way.
    pub errors: Vec<String>,
}

/// The consolidation engine.
pub struct ConsolidationEngine {
    repository: Arc<dyn MemoryRepository>,
    config: ConsolidationConfig,
    scan_limit: usize,
    counters: Arc<BankCounters>,
}

impl ConsolidationEngine {
    /// Create a new engine over `repository`.
    ///
    /// `scan_limit` caps how many active records one run examines, which in
    /// turn bounds the merge pass at `scan_limit²` comparisons.
    #[must_use]
    pub fn new(
        repository: Arc<dyn MemoryRepository>,
        config: ConsolidationConfig,
        scan_limit: usize,
    ) -> Self {
        Self {
            repository,
            config,
            scan_limit,
            counters: Arc::new(BankCounters::new()),
        }
    }

    /// Share a counter set with the rest of the process.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<BankCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Run prune → merge → archive and return the run summary.
    pub async fn consolidate(&self) -> ConsolidationStats {
        let started_at = Utc::now();
        let mut stats = ConsolidationStats {
            started_at,
            finished_at: started_at,
            total_memories_before: 0,
            pruned: 0,
            merged: 0,
            archived: 0,
            success: true,
            errors: Vec::new(),
        };

        let records = match self.repository.scan_all(self.scan_limit).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "consolidation scan failed");
                stats.success = false;
                stats.errors.push(format!("scan failed: {e}"));
                stats.finished_at = Utc::now();
                return stats;
            }
        };
        stats.total_memories_before = records.len();

        let mut live: BTreeMap<MemoryId, MemoryRecord> =
            records.into_iter().map(|r| (r.id, r)).collect();

        self.prune_pass(&mut live, &mut stats).await;
        self.merge_pass(&mut live, &mut stats).await;
        self.archive_pass(&live, &mut stats).await;

        stats.finished_at = Utc::now();
        BankCounters::bump(&self.counters.consolidation_runs);
        BankCounters::add(&self.counters.memories_pruned, stats.pruned as u64);
        BankCounters::add(&self.counters.memories_merged, stats.merged as u64);
        BankCounters::add(&self.counters.memories_archived, stats.archived as u64);

        info!(
            before = stats.total_memories_before,
            pruned = stats.pruned,
            merged = stats.merged,
            archived = stats.archived,
            errors = stats.errors.len(),
            elapsed_ms = (stats.finished_at - stats.started_at).num_milliseconds(),
            "consolidation finished"
        );
        stats
    }

    /// Whether a record meets the prune predicate.
    fn should_prune(&self, record: &MemoryRecord) -> bool {
        record.times_retrieved >= self.config.min_retrievals_for_prune
            && matches!(record.success_rate,
                        Some(rate) if rate < self.config.low_quality_threshold)
    }

    // ------------------------------------------------------------------
    // Pass A — prune low-quality
    // ------------------------------------------------------------------

    async fn prune_pass(
        &self,
        live: &mut BTreeMap<MemoryId, MemoryRecord>,
        stats: &mut ConsolidationStats,
    ) {
        let victims: Vec<MemoryId> = live
            .values()
            .filter(|r| self.should_prune(r))
            .map(|r| r.id)
            .collect();

        for id in victims {
            match self.repository.delete(&id).await {
                Ok(()) => {
                    debug!(%id, "pruned low-quality memory");
                    live.remove(&id);
                    stats.pruned += 1;
                }
                // Deleted by someone else between scan and now — fine.
                Err(BankError::NotFound(_)) => {
                    live.remove(&id);
                }
                Err(e) => {
                    warn!(%id, error = %e, "prune delete failed, skipping");
                    stats.errors.push(format!("prune {id}: {e}"));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Pass B — detect & merge near-duplicates
    // ------------------------------------------------------------------

    async fn merge_pass(
        &self,
        live: &mut BTreeMap<MemoryId, MemoryRecord>,
        stats: &mut ConsolidationStats,
    ) {
        // All unordered candidate pairs at or above the duplicate threshold,
        // strongest matches first so the tightest clusters merge first.
        let ids: Vec<MemoryId> = live.keys().copied().collect();
        let mut candidates: Vec<(OrderedFloat<f64>, MemoryId, MemoryId)> = Vec::new();
        for (i, a) in ids.iter().enumerate() {
            for b in ids.iter().skip(i + 1) {
                let (ra, rb) = (&live[a], &live[b]);
                if ra.embedding.0.is_empty() || rb.embedding.0.is_empty() {
                    continue;
                }
                let sim = ra.embedding.cosine_similarity(&rb.embedding);
                if sim >= self.config.dup_similarity_threshold {
                    candidates.push((OrderedFloat(sim), *a, *b));
                }
            }
        }
        candidates.sort_by(|x, y| y.0.cmp(&x.0));
        debug!(pairs = candidates.len(), "duplicate candidates found");

        // A record that loses one merge is out for the rest of this pass;
        // winners stay eligible and keep accumulating.
        let mut consumed: BTreeSet<MemoryId> = BTreeSet::new();

        for (sim, a, b) in candidates {
            if consumed.contains(&a) || consumed.contains(&b) {
                continue;
            }
            let (Some(ra), Some(rb)) = (live.get(&a), live.get(&b)) else {
                continue;
            };
            let (winner, loser) = elect_winner(ra, rb);
            let (winner, loser) = (winner.clone(), loser.clone());

            let mut folded = winner.clone();
            folded.absorb(&loser, Utc::now());

            let patch = RecordPatch {
                times_retrieved: Some(folded.times_retrieved),
                times_used_in_success: Some(folded.times_used_in_success),
                times_used_in_failure: Some(folded.times_used_in_failure),
                ..RecordPatch::default()
            };
            let updated = match self.repository.update(&winner.id, patch).await {
                Ok(updated) => updated,
                Err(BankError::NotFound(_)) => {
                    live.remove(&winner.id);
                    continue;
                }
                Err(e) => {
                    warn!(winner = %winner.id, loser = %loser.id, error = %e,
                          "merge update failed, skipping pair");
                    stats.errors.push(format!("merge {}: {e}", winner.id));
                    continue;
                }
            };

            match self.repository.delete(&loser.id).await {
                Ok(()) | Err(BankError::NotFound(_)) => {
                    debug!(
                        winner = %winner.id,
                        loser = %loser.id,
                        similarity = sim.into_inner(),
                        "merged duplicate pair"
                    );
                    stats.merged += 1;
                }
                Err(e) => {
                    warn!(loser = %loser.id, error = %e, "merge delete failed");
                    stats.errors.push(format!("merge delete {}: {e}", loser.id));
                }
            }

            consumed.insert(loser.id);
            live.remove(&loser.id);
            live.insert(updated.id, updated);
        }
    }

    // ------------------------------------------------------------------
    // Pass C — archive stale
    // ------------------------------------------------------------------

    async fn archive_pass(
        &self,
        live: &BTreeMap<MemoryId, MemoryRecord>,
        stats: &mut ConsolidationStats,
    ) {
        let now = Utc::now();
        for record in live.values() {
            if !record.is_stale(now, self.config.stale_days) {
                continue;
            }
            match self.repository.archive(&record.id).await {
                Ok(()) => {
                    debug!(id = %record.id, "archived stale memory");
                    stats.archived += 1;
                }
                Err(BankError::NotFound(_)) => {}
                Err(e) => {
                    warn!(id = %record.id, error = %e, "archive failed, skipping");
                    stats.errors.push(format!("archive {}: {e}", record.id));
                }
            }
        }
    }
}

/// Pick the surviving twin of a duplicate pair.
///
/// Higher success rate wins; an unrated record loses to any rated one. Ties
/// go to the record retrieved more often, then to the older record, then to
/// the smaller id for determinism.
fn elect_winner<'a>(
    a: &'a MemoryRecord,
    b: &'a MemoryRecord,
) -> (&'a MemoryRecord, &'a MemoryRecord) {
    let ordering = match (a.success_rate, b.success_rate) {
        (Some(x), Some(y)) => OrderedFloat(x).cmp(&OrderedFloat(y)),
        (Some(_), None) => std::cmp::Ordering::Greater,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (None, None) => std::cmp::Ordering::Equal,
    }
    .then_with(|| a.times_retrieved.cmp(&b.times_retrieved))
    .then_with(|| b.created_at.cmp(&a.created_at)) // older wins
    .then_with(|| b.id.cmp(&a.id)); // smaller id wins

    if ordering == std::cmp::Ordering::Less {
        (b, a)
    } else {
        (a, b)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsolidationConfig;
    use crate::record::MemoryDraft;
    use crate::repository::{InMemoryRepository, MemoryRepository, RetrievalFilter};
    use crate::types::{Embedding, MemoryCategory, MemorySource, MemoryStatus};
    use async_trait::async_trait;
    use chrono::Duration;

    const DIMS: usize = 4;

    fn seeded(
        title: &str,
        embedding: Vec<f32>,
        times_retrieved: u64,
        successes: u64,
        failures: u64,
    ) -> MemoryRecord {
        let now = Utc::now();
        let mut record = MemoryRecord::from_draft(
            MemoryId::new(),
            MemoryDraft {
                title: title.to_string(),
                description: "d".to_string(),
                content: "c".to_string(),
                category: MemoryCategory::GeneralStrategy,
                source: MemorySource::TaskFailure,
                embedding: Embedding(embedding),
            },
            now,
        );
        record.times_retrieved = times_retrieved;
        record.times_used_in_success = successes;
        record.times_used_in_failure = failures;
        record.recompute_success_rate();
        record
    }

    fn engine(repo: Arc<InMemoryRepository>) -> ConsolidationEngine {
        ConsolidationEngine::new(repo, ConsolidationConfig::default(), 10_000)
    }

    #[tokio::test]
    async fn prunes_only_judged_low_quality_records() {
        let repo = Arc::new(InMemoryRepository::new(DIMS));
        // A: judged and failing → pruned.
        let a = seeded("a", vec![1.0, 0.0, 0.0, 0.0], 10, 1, 9);
        // B: judged and adequate → kept.
        let b = seeded("b", vec![0.0, 1.0, 0.0, 0.0], 10, 5, 5);
        // C: failing but under the retrieval floor → kept.
        let c = seeded("c", vec![0.0, 0.0, 1.0, 0.0], 5, 0, 5);
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        repo.insert_snapshot(a).expect("seed");
        repo.insert_snapshot(b).expect("seed");
        repo.insert_snapshot(c).expect("seed");

        let stats = engine(Arc::clone(&repo)).consolidate().await;
        assert!(stats.success);
        assert_eq!(stats.pruned, 1);
        assert_eq!(stats.merged, 0);
        assert_eq!(stats.archived, 0);

        assert!(repo.get(&a_id).await.expect("get").is_none());
        assert!(repo.get(&b_id).await.expect("get").is_some());
        assert!(repo.get(&c_id).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn merges_identical_twins_into_the_stronger() {
        let repo = Arc::new(InMemoryRepository::new(DIMS));
        let r1 = seeded("strong", vec![0.5; DIMS], 10, 8, 2); // rate 0.8
        let r2 = seeded("weak", vec![0.5; DIMS], 5, 3, 2); // rate 0.6
        let (r1_id, r2_id) = (r1.id, r2.id);
        repo.insert_snapshot(r1).expect("seed");
        repo.insert_snapshot(r2).expect("seed");

        let stats = engine(Arc::clone(&repo)).consolidate().await;
        assert_eq!(stats.merged, 1);

        let survivor = repo.get(&r1_id).await.expect("get").expect("survivor");
        assert_eq!(survivor.times_retrieved, 15);
        assert_eq!(survivor.times_used_in_success, 11);
        assert_eq!(survivor.times_used_in_failure, 4);
        let rate = survivor.success_rate.expect("rate");
        assert!((rate - 11.0 / 15.0).abs() < 1e-12);
        survivor.check_stats().expect("invariants hold");

        assert!(repo.get(&r2_id).await.expect("get").is_none(), "loser deleted");
    }

    #[tokio::test]
    async fn unrated_twin_loses_to_rated() {
        let repo = Arc::new(InMemoryRepository::new(DIMS));
        let rated = seeded("rated", vec![0.5; DIMS], 2, 1, 1);
        let unrated = seeded("unrated", vec![0.5; DIMS], 100, 0, 0);
        let rated_id = rated.id;
        repo.insert_snapshot(rated).expect("seed");
        repo.insert_snapshot(unrated).expect("seed");

        let stats = engine(Arc::clone(&repo)).consolidate().await;
        assert_eq!(stats.merged, 1);
        let survivor = repo.get(&rated_id).await.expect("get");
        assert!(survivor.is_some(), "the rated twin survives");
    }

    #[tokio::test]
    async fn transitive_duplicates_merge_pairwise_once() {
        let repo = Arc::new(InMemoryRepository::new(DIMS));
        // Three identical records: exactly two merges fold them into one.
        for (i, tr) in [(0, 30_u64), (1, 20), (2, 10)] {
            repo.insert_snapshot(seeded(&format!("t{i}"), vec![0.5; DIMS], tr, tr / 2, tr / 2))
                .expect("seed");
        }

        let stats = engine(Arc::clone(&repo)).consolidate().await;
        assert_eq!(stats.merged, 2);
        assert_eq!(repo.scan_all(10).await.expect("scan").len(), 1);
    }

    #[tokio::test]
    async fn archives_only_genuinely_stale_records() {
        let repo = Arc::new(InMemoryRepository::new(DIMS));
        let now = Utc::now();

        let mut old = seeded("old", vec![1.0, 0.0, 0.0, 0.0], 0, 0, 0);
        old.created_at = now - Duration::days(150);
        old.updated_at = now - Duration::days(100);
        let mut fresh = seeded("fresh", vec![0.0, 1.0, 0.0, 0.0], 0, 0, 0);
        fresh.created_at = now - Duration::days(150);
        fresh.updated_at = now - Duration::days(30);
        let (old_id, fresh_id) = (old.id, fresh.id);
        repo.insert_snapshot(old).expect("seed");
        repo.insert_snapshot(fresh).expect("seed");

        let stats = engine(Arc::clone(&repo)).consolidate().await;
        assert_eq!(stats.archived, 1);

        let old_rec = repo.get(&old_id).await.expect("get").expect("found");
        assert_eq!(old_rec.status, MemoryStatus::Archived);
        let fresh_rec = repo.get(&fresh_id).await.expect("get").expect("found");
        assert_eq!(fresh_rec.status, MemoryStatus::Active);

        // Archived records no longer come back from retrieval.
        let hits = repo
            .retrieve_by_embedding(
                &Embedding(vec![1.0, 0.0, 0.0, 0.0]),
                10,
                &RetrievalFilter::default(),
            )
            .await
            .expect("retrieve");
        assert!(hits.iter().all(|r| r.id != old_id));
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let repo = Arc::new(InMemoryRepository::new(DIMS));
        repo.insert_snapshot(seeded("prunable", vec![1.0, 0.0, 0.0, 0.0], 10, 1, 9))
            .expect("seed");
        repo.insert_snapshot(seeded("twin-a", vec![0.5; DIMS], 10, 8, 2))
            .expect("seed");
        repo.insert_snapshot(seeded("twin-b", vec![0.5; DIMS], 5, 3, 2))
            .expect("seed");
        let mut stale = seeded("stale", vec![0.0, 1.0, 0.0, 0.0], 0, 0, 0);
        stale.created_at = Utc::now() - Duration::days(120);
        stale.updated_at = Utc::now() - Duration::days(120);
        repo.insert_snapshot(stale).expect("seed");

        let engine = engine(Arc::clone(&repo));
        let first = engine.consolidate().await;
        assert_eq!(first.pruned, 1);
        assert_eq!(first.merged, 1);
        assert_eq!(first.archived, 1);

        let second = engine.consolidate().await;
        assert!(second.success);
        assert_eq!(second.pruned, 0);
        assert_eq!(second.merged, 0);
        assert_eq!(second.archived, 0);
    }

    // A repository whose scan always fails.
    struct UnavailableRepository;

    #[async_trait]
    impl MemoryRepository for UnavailableRepository {
        async fn add(&self, _draft: MemoryDraft) -> crate::error::Result<MemoryId> {
            Err(BankError::StoreUnavailable("down".to_string()))
        }
        async fn get(&self, _id: &MemoryId) -> crate::error::Result<Option<MemoryRecord>> {
            Err(BankError::StoreUnavailable("down".to_string()))
        }
        async fn update(
            &self,
            _id: &MemoryId,
            _patch: RecordPatch,
        ) -> crate::error::Result<MemoryRecord> {
            Err(BankError::StoreUnavailable("down".to_string()))
        }
        async fn delete(&self, _id: &MemoryId) -> crate::error::Result<()> {
            Err(BankError::StoreUnavailable("down".to_string()))
        }
        async fn archive(&self, _id: &MemoryId) -> crate::error::Result<()> {
            Err(BankError::StoreUnavailable("down".to_string()))
        }
        async fn scan_all(&self, _limit: usize) -> crate::error::Result<Vec<MemoryRecord>> {
            Err(BankError::StoreUnavailable("down".to_string()))
        }
        async fn retrieve_by_embedding(
            &self,
            _query: &Embedding,
            _k: usize,
            _filter: &RetrievalFilter,
        ) -> crate::error::Result<Vec<MemoryRecord>> {
            Err(BankError::StoreUnavailable("down".to_string()))
        }
        async fn update_stats(
            &self,
            _ids: &[MemoryId],
            _succeeded: bool,
        ) -> crate::error::Result<()> {
            Err(BankError::StoreUnavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn failed_scan_marks_run_unsuccessful() {
        let engine = ConsolidationEngine::new(
            Arc::new(UnavailableRepository),
            ConsolidationConfig::default(),
            10_000,
        );
        let stats = engine.consolidate().await;
        assert!(!stats.success);
        assert_eq!(stats.pruned + stats.merged + stats.archived, 0);
        assert!(!stats.errors.is_empty());
    }
}
