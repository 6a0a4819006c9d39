//! Parallel self-contrast — fan out N memory-seeded trajectories, score,
//! keep the best.
//!
//! The fan-out is structured: a [`tokio::task::JoinSet`] owns every
//! trajectory, all variants are awaited before selection, and dropping the
//! set (cancellation) aborts whatever is still in flight. Wall-clock cost is
//! bounded by the slowest executor call.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::MattsConfig;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::matts::{round_robin_subsets, TaskExecutor, Trajectory};
use crate::metrics::BankCounters;
use crate::record::MemoryRecord;
use crate::repository::{MemoryRepository, RetrievalFilter};
use crate::scoring::score_trajectory;
use crate::types::{EmbeddingKind, MemoryId, TaskSpec, TrajectoryResult};

/// Memories retrieved per requested variant.
const MEMORIES_PER_VARIANT: usize = 3;

/// The parallel scaling strategy.
pub struct ParallelScaling {
    repository: Arc<dyn MemoryRepository>,
    embedder: Arc<dyn Embedder>,
    config: MattsConfig,
    counters: Arc<BankCounters>,
}

impl ParallelScaling {
    /// Create a new parallel scaling strategy.
    #[must_use]
    pub fn new(
        repository: Arc<dyn MemoryRepository>,
        embedder: Arc<dyn Embedder>,
        config: MattsConfig,
    ) -> Self {
        Self {
            repository,
            embedder,
            config,
            counters: Arc::new(BankCounters::new()),
        }
    }

    /// Share a counter set with the rest of the process.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<BankCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// Run up to `variants` concurrent trajectories and return the winning
    /// executor result.
    ///
    /// Falls back to a single unseeded call when the feature is disabled,
    /// `variants` is zero, or no memories qualify. Executor failures become
    /// score-zero trajectories; when every trajectory fails, the first
    /// variant's (failure) result is returned rather than nothing.
    ///
    /// # Errors
    ///
    /// Propagates embedder and repository failures — retrieval cannot
    /// proceed meaningfully without a query vector.
    pub async fn run(
        &self,
        task: &TaskSpec,
        executor: Arc<dyn TaskExecutor>,
        variants: usize,
    ) -> Result<TrajectoryResult> {
        if !self.config.parallel_enabled || variants == 0 {
            debug!(variants, enabled = self.config.parallel_enabled, "parallel scaling bypassed");
            return Ok(self.single(task, &executor).await);
        }
        self.counters.bump_parallel_runs();

        let query = self
            .embedder
            .embed(&task.query_text(), EmbeddingKind::Query)
            .await?;

        let filter = RetrievalFilter {
            min_success_rate: Some(self.config.parallel_min_success_rate),
            categories: None,
        };
        let memories = self
            .repository
            .retrieve_by_embedding(&query, MEMORIES_PER_VARIANT * variants, &filter)
            .await?;

        if memories.is_empty() {
            debug!("no qualifying memories, falling back to single execution");
            return Ok(self.single(task, &executor).await);
        }

        let subsets = round_robin_subsets(&memories, variants);
        let mut set = JoinSet::new();
        for (variant, subset) in subsets.into_iter().enumerate() {
            let executor = Arc::clone(&executor);
            let task = task.clone();
            set.spawn(async move { run_trajectory(variant, task, executor, subset).await });
        }

        let mut trajectories: Vec<Trajectory> = Vec::with_capacity(variants);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(trajectory) => trajectories.push(trajectory),
                Err(e) => warn!(error = %e, "trajectory task aborted"),
            }
        }
        // Launch order is the tie-break order.
        trajectories.sort_by_key(|t| t.variant);

        if trajectories.is_empty() {
            return Ok(TrajectoryResult::failure("all trajectories aborted"));
        }

        let winner = trajectories
            .iter()
            .filter(|t| t.result.success)
            .fold(None::<&Trajectory>, |best, t| match best {
                Some(b) if t.score <= b.score => Some(b),
                _ => Some(t),
            });

        match winner {
            Some(winner) => {
                info!(
                    variant = winner.variant,
                    score = winner.score,
                    memories = winner.memory_ids.len(),
                    "parallel scaling selected a winner"
                );
                // Best-effort: a stats failure must not cost us the result.
                if let Err(e) = self
                    .repository
                    .update_stats(&winner.memory_ids, true)
                    .await
                {
                    warn!(error = %e, "failed to update winner memory stats");
                }
                Ok(winner.result.clone())
            }
            None => {
                info!(variants = trajectories.len(), "all trajectories failed");
                Ok(trajectories[0].result.clone())
            }
        }
    }

    async fn single(&self, task: &TaskSpec, executor: &Arc<dyn TaskExecutor>) -> TrajectoryResult {
        match executor.execute(task, &[]).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "executor failed in single-call fallback");
                TrajectoryResult::failure(e.to_string())
            }
        }
    }
}

async fn run_trajectory(
    variant: usize,
    task: TaskSpec,
    executor: Arc<dyn TaskExecutor>,
    memories: Vec<MemoryRecord>,
) -> Trajectory {
    let memory_ids: Vec<MemoryId> = memories.iter().map(|m| m.id).collect();
    match executor.execute(&task, &memories).await {
        Ok(result) => {
            let score = score_trajectory(Some(&result));
            Trajectory {
                variant,
                result,
                score,
                memory_ids,
            }
        }
        Err(e) => {
            warn!(variant, error = %e, "trajectory executor failed");
            Trajectory {
                variant,
                result: TrajectoryResult::failure(e.to_string()),
                score: 0.0,
                memory_ids,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
