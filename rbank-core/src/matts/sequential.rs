//! Sequential self-refinement — iterate execute → reflect with a hard
//! iteration cap, tracking the best result seen.
//!
//! Iterations are strictly sequential: iteration k+1 starts only after the
//! reflector has returned for iteration k. The returned value is the best
//! result across all iterations, which is not necessarily the last one.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::MattsConfig;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::matts::{TaskExecutor, TaskReflector};
use crate::metrics::BankCounters;
use crate::repository::{MemoryRepository, RetrievalFilter};
use crate::scoring::score_trajectory;
use crate::types::{EmbeddingKind, TaskPatch, TaskSpec, TrajectoryResult};

/// The sequential scaling strategy.
pub struct SequentialScaling {
    repository: Arc<dyn MemoryRepository>,
    embedder: Arc<dyn Embedder>,
    config: MattsConfig,
    counters: Arc<BankCounters>,
}

impl SequentialScaling {
    /// Create a new sequential scaling strategy.
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

    /// Run up to `max_iterations` refine-execute rounds and return the best
    /// result seen.
    ///
    /// Early stop: a successful iteration scoring above the configured
    /// threshold ends the loop. Without a reflector, the loop ends after the
    /// first success (failed iterations retry the unchanged task, still
    /// bounded by the cap). A reflector failure ends the loop; the best
    /// result so far is returned. When every iteration fails, the last
    /// (failure) result is returned rather than nothing.
    ///
    /// # Errors
    ///
    /// Propagates embedder and repository failures — retrieval cannot
    /// proceed meaningfully without a query vector.
    pub async fn run(
        &self,
        task: &TaskSpec,
        executor: Arc<dyn TaskExecutor>,
        reflector: Option<Arc<dyn TaskReflector>>,
        max_iterations: usize,
    ) -> Result<TrajectoryResult> {
        if !self.config.sequential_enabled || max_iterations == 0 {
            debug!(
                max_iterations,
                enabled = self.config.sequential_enabled,
                "sequential scaling bypassed"
            );
            return Ok(self.single(task, &executor).await);
        }
        self.counters.bump_sequential_runs();

        let filter = RetrievalFilter {
            min_success_rate: Some(self.config.sequential_min_success_rate),
            categories: None,
        };

        let mut current = task.clone();
        let mut best: Option<TrajectoryResult> = None;
        let mut best_score = 0.0_f64;
        let mut last: Option<TrajectoryResult> = None;

        for iteration in 1..=max_iterations {
            let query = self
                .embedder
                .embed(&current.query_text(), EmbeddingKind::Query)
                .await?;
            let memories = self
                .repository
                .retrieve_by_embedding(&query, self.config.sequential_top_k, &filter)
                .await?;

            let result = match executor.execute(&current, &memories).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(iteration, error = %e, "iteration executor failed");
                    TrajectoryResult::failure(e.to_string())
                }
            };
            let score = score_trajectory(Some(&result));
            debug!(iteration, score, success = result.success, "iteration complete");

            if score > best_score {
                best_score = score;
                best = Some(result.clone());
            }
            let succeeded = result.success;
            last = Some(result.clone());

            if succeeded && score > self.config.early_stop_score {
                info!(iteration, score, "early stop on high-scoring success");
                break;
            }

            match &reflector {
                None => {
                    if succeeded {
                        break;
                    }
                    // Retry the unchanged task; bounded by max_iterations.
                }
                Some(reflector) => {
                    match reflector.reflect(&current, &result, &memories).await {
                        Err(e) => {
                            warn!(iteration, error = %e, "reflector failed, stopping");
                            break;
                        }
                        Ok(reflection) if !reflection.should_refine => {
                            debug!(iteration, "reflector declined to refine");
                            break;
                        }
                        Ok(reflection) => {
                            let patch =
                                reflection.refined_task.unwrap_or_else(TaskPatch::default);
                            current = current.merged(&patch);
                        }
                    }
                }
            }
        }

        Ok(best
            .or(last)
            .unwrap_or_else(|| TrajectoryResult::failure("no iterations ran")))
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

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
