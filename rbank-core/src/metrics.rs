//! Runtime counters and instrumentation.
//!
//! Lock-free `AtomicU64` counters incremented in the hot path and read on
//! dashboard export. A [`CounterSnapshot`] can be rendered as
//! Prometheus-compatible text.
//!
//! Subsystems also emit `tracing` spans; the span names are collected in
//! [`spans`] so profilers see a stable naming scheme.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters for high-frequency ReasoningBank events.
pub struct BankCounters {
    /// Memory records persisted.
    pub memories_added: AtomicU64,
    /// Records hard-deleted by the prune pass.
    pub memories_pruned: AtomicU64,
    /// Duplicate pairs folded by the merge pass.
    pub memories_merged: AtomicU64,
    /// Records archived by the staleness pass.
    pub memories_archived: AtomicU64,
    /// Similarity retrieval calls served.
    pub retrievals: AtomicU64,
    /// Individual records returned across all retrievals.
    pub records_retrieved: AtomicU64,
    /// Success/failure outcome updates applied.
    pub stat_updates: AtomicU64,
    /// Extraction operations started.
    pub extraction_calls: AtomicU64,
    /// Extraction candidates rejected during validation.
    pub extraction_candidates_rejected: AtomicU64,
    /// Text-generation calls issued.
    pub llm_calls: AtomicU64,
    /// Generation responses that failed JSON salvage.
    pub llm_parse_failures: AtomicU64,
    /// Parallel scaling runs started.
    pub matts_parallel_runs: AtomicU64,
    /// Sequential scaling runs started.
    pub matts_sequential_runs: AtomicU64,
    /// Consolidation runs completed.
    pub consolidation_runs: AtomicU64,
}

impl BankCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            memories_added: AtomicU64::new(0),
            memories_pruned: AtomicU64::new(0),
            memories_merged: AtomicU64::new(0),
            memories_archived: AtomicU64::new(0),
            retrievals: AtomicU64::new(0),
            records_retrieved: AtomicU64::new(0),
            stat_updates: AtomicU64::new(0),
            extraction_calls: AtomicU64::new(0),
            extraction_candidates_rejected: AtomicU64::new(0),
            llm_calls: AtomicU64::new(0),
            llm_parse_failures: AtomicU64::new(0),
            matts_parallel_runs: AtomicU64::new(0),
            matts_sequential_runs: AtomicU64::new(0),
            consolidation_runs: AtomicU64::new(0),
        }
    }

    /// Increment a counter by one.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Record that a parallel scaling run started.
    pub fn bump_parallel_runs(&self) {
        Self::bump(&self.matts_parallel_runs);
    }

    /// Record that a sequential scaling run started.
    pub fn bump_sequential_runs(&self) {
        Self::bump(&self.matts_sequential_runs);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            memories_added: self.memories_added.load(Ordering::Relaxed),
            memories_pruned: self.memories_pruned.load(Ordering::Relaxed),
            memories_merged: self.memories_merged.load(Ordering::Relaxed),
            memories_archived: self.memories_archived.load(Ordering::Relaxed),
            retrievals: self.retrievals.load(Ordering::Relaxed),
            records_retrieved: self.records_retrieved.load(Ordering::Relaxed),
            stat_updates: self.stat_updates.load(Ordering::Relaxed),
            extraction_calls: self.extraction_calls.load(Ordering::Relaxed),
            extraction_candidates_rejected: self
                .extraction_candidates_rejected
                .load(Ordering::Relaxed),
            llm_calls: self.llm_calls.load(Ordering::Relaxed),
            llm_parse_failures: self.llm_parse_failures.load(Ordering::Relaxed),
            matts_parallel_runs: self.matts_parallel_runs.load(Ordering::Relaxed),
            matts_sequential_runs: self.matts_sequential_runs.load(Ordering::Relaxed),
            consolidation_runs: self.consolidation_runs.load(Ordering::Relaxed),
        }
    }
}

impl Default for BankCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of counter values at a point in time.
#[derive(Debug, Clone)]
pub struct CounterSnapshot {
    /// Memory records persisted.
    pub memories_added: u64,
    /// Records hard-deleted by the prune pass.
    pub memories_pruned: u64,
    /// Duplicate pairs folded by the merge pass.
    pub memories_merged: u64,
    /// Records archived by the staleness pass.
    pub memories_archived: u64,
    /// Similarity retrieval calls served.
    pub retrievals: u64,
    /// Individual records returned across all retrievals.
    pub records_retrieved: u64,
    /// Outcome updates applied.
    pub stat_updates: u64,
    /// Extraction operations started.
    pub extraction_calls: u64,
    /// Extraction candidates rejected.
    pub extraction_candidates_rejected: u64,
    /// Text-generation calls issued.
    pub llm_calls: u64,
    /// Generation responses that failed JSON salvage.
    pub llm_parse_failures: u64,
    /// Parallel scaling runs.
    pub matts_parallel_runs: u64,
    /// Sequential scaling runs.
    pub matts_sequential_runs: u64,
    /// Consolidation runs completed.
    pub consolidation_runs: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP rbank_memories_added_total Memory records persisted\n\
             # TYPE rbank_memories_added_total counter\n\
             rbank_memories_added_total {}\n\
             # HELP rbank_memories_pruned_total Records deleted by the prune pass\n\
             # TYPE rbank_memories_pruned_total counter\n\
             rbank_memories_pruned_total {}\n\
             # HELP rbank_memories_merged_total Duplicate pairs folded\n\
             # TYPE rbank_memories_merged_total counter\n\
             rbank_memories_merged_total {}\n\
             # HELP rbank_memories_archived_total Records archived as stale\n\
             # TYPE rbank_memories_archived_total counter\n\
             rbank_memories_archived_total {}\n\
             # HELP rbank_retrievals_total Similarity retrieval calls\n\
             # TYPE rbank_retrievals_total counter\n\
             rbank_retrievals_total {}\n\
             # HELP rbank_records_retrieved_total Records returned by retrieval\n\
             # TYPE rbank_records_retrieved_total counter\n\
             rbank_records_retrieved_total {}\n\
             # HELP rbank_stat_updates_total Outcome updates applied\n\
             # TYPE rbank_stat_updates_total counter\n\
             rbank_stat_updates_total {}\n\
             # HELP rbank_extraction_calls_total Extraction operations\n\
             # TYPE rbank_extraction_calls_total counter\n\
             rbank_extraction_calls_total {}\n\
             # HELP rbank_extraction_rejected_total Extraction candidates rejected\n\
             # TYPE rbank_extraction_rejected_total counter\n\
             rbank_extraction_rejected_total {}\n\
             # HELP rbank_llm_calls_total Text-generation calls\n\
             # TYPE rbank_llm_calls_total counter\n\
             rbank_llm_calls_total {}\n\
             # HELP rbank_llm_parse_failures_total Responses failing JSON salvage\n\
             # TYPE rbank_llm_parse_failures_total counter\n\
             rbank_llm_parse_failures_total {}\n\
             # HELP rbank_matts_runs_total Scaling runs by strategy\n\
             # TYPE rbank_matts_runs_total counter\n\
             rbank_matts_runs_total{{strategy=\"parallel\"}} {}\n\
             rbank_matts_runs_total{{strategy=\"sequential\"}} {}\n\
             # HELP rbank_consolidation_runs_total Consolidation runs\n\
             # TYPE rbank_consolidation_runs_total counter\n\
             rbank_consolidation_runs_total {}\n",
            self.memories_added,
            self.memories_pruned,
            self.memories_merged,
            self.memories_archived,
            self.retrievals,
            self.records_retrieved,
            self.stat_updates,
            self.extraction_calls,
            self.extraction_candidates_rejected,
            self.llm_calls,
            self.llm_parse_failures,
            self.matts_parallel_runs,
            self.matts_sequential_runs,
            self.consolidation_runs,
        )
    }
}

// ---------------------------------------------------------------------------
// Tracing span names
// ---------------------------------------------------------------------------

/// Span names used with `tracing::span!` for profiler integration.
pub mod spans {
    /// Similarity retrieval.
    pub const RETRIEVE: &str = "rbank::retrieve";
    /// Consolidation run.
    pub const CONSOLIDATE: &str = "rbank::consolidate";
    /// Prune pass.
    pub const PRUNE: &str = "rbank::consolidate::prune";
    /// Merge pass.
    pub const MERGE: &str = "rbank::consolidate::merge";
    /// Archive pass.
    pub const ARCHIVE: &str = "rbank::consolidate::archive";
    /// Parallel scaling run.
    pub const MATTS_PARALLEL: &str = "rbank::matts::parallel";
    /// Sequential scaling run.
    pub const MATTS_SEQUENTIAL: &str = "rbank::matts::sequential";
    /// Extraction operation.
    pub const EXTRACT: &str = "rbank::extract";
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
