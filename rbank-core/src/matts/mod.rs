//! Memory-aware test-time scaling (MaTTS).
//!
//! Two strategies wrap an opaque, user-supplied task executor:
//!
//! - [`ParallelScaling`] — *self-contrast*: fan out N concurrently running
//!   trajectories seeded with disjoint memory subsets, score each, keep the
//!   best.
//! - [`SequentialScaling`] — *self-refinement*: iterate execute → reflect,
//!   refining the task between iterations and tracking the best result seen.
//!
//! The executor and reflector are modeled as narrow capability traits; the
//! strategies catch their failures (a failing variant becomes a score-zero
//! trajectory, a failing reflector ends the loop) so a host process never
//! crashes because scaling went wrong.

pub mod parallel;
pub mod sequential;

pub use parallel::ParallelScaling;
pub use sequential::SequentialScaling;

use async_trait::async_trait;

use crate::error::Result;
use crate::record::MemoryRecord;
use crate::types::{MemoryId, Reflection, TaskSpec, TrajectoryResult};

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// Execute a task, optionally seeded with retrieved memories.
///
/// The result must populate the fields the trajectory scorer reads:
/// `success`, and optionally `steps`, `execution_time_ms`, `output_data`,
/// and `html_report`.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run the task once.
    ///
    /// # Errors
    ///
    /// Implementations may fail with any [`crate::BankError`]; the scaling
    /// strategies convert failures into score-zero trajectories.
    async fn execute(
        &self,
        task: &TaskSpec,
        memories: &[MemoryRecord],
    ) -> Result<TrajectoryResult>;
}

/// Reflect on an execution result and propose a refined task.
#[async_trait]
pub trait TaskReflector: Send + Sync {
    /// Inspect `result` and decide whether (and how) to refine `task`.
    ///
    /// # Errors
    ///
    /// A reflector failure terminates the sequential loop; the best result
    /// so far is still returned.
    async fn reflect(
        &self,
        task: &TaskSpec,
        result: &TrajectoryResult,
        memories: &[MemoryRecord],
    ) -> Result<Reflection>;
}

// ---------------------------------------------------------------------------
// Trajectory
// ---------------------------------------------------------------------------

/// One executor invocation plus its score — the unit of comparison.
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// Launch-order index of the variant that produced this trajectory.
    pub variant: usize,
    /// The raw executor result (a failure wrapper when the executor erred).
    pub result: TrajectoryResult,
    /// Score assigned by [`crate::scoring::score_trajectory`].
    pub score: f64,
    /// Ids of the memories this variant was seeded with.
    pub memory_ids: Vec<MemoryId>,
}

/// Distribute memories into `n` disjoint-by-position subsets, round-robin:
/// variant `i` gets the memories at positions `i, i+n, i+2n, …`. Variants
/// beyond the memory count get empty subsets but still run.
#[must_use]
pub(crate) fn round_robin_subsets(memories: &[MemoryRecord], n: usize) -> Vec<Vec<MemoryRecord>> {
    let mut subsets = vec![Vec::new(); n];
    for (position, memory) in memories.iter().enumerate() {
        subsets[position % n].push(memory.clone());
    }
    subsets
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MemoryDraft;
    use crate::types::{Embedding, MemoryCategory, MemorySource};
    use chrono::Utc;

    fn record(i: usize) -> MemoryRecord {
        MemoryRecord::from_draft(
            MemoryId::new(),
            MemoryDraft {
                title: format!("m{i}"),
                description: "d".to_string(),
                content: "c".to_string(),
                category: MemoryCategory::GeneralStrategy,
                source: MemorySource::TaskSuccess,
                embedding: Embedding(vec![1.0]),
            },
            Utc::now(),
        )
    }

    #[test]
    fn round_robin_is_disjoint_by_position() {
        let memories: Vec<MemoryRecord> = (0..7).map(record).collect();
        let subsets = round_robin_subsets(&memories, 3);

        assert_eq!(subsets.len(), 3);
        assert_eq!(subsets[0].len(), 3); // positions 0, 3, 6
        assert_eq!(subsets[1].len(), 2); // positions 1, 4
        assert_eq!(subsets[2].len(), 2); // positions 2, 5
        assert_eq!(subsets[0][0].id, memories[0].id);
        assert_eq!(subsets[0][1].id, memories[3].id);
        assert_eq!(subsets[1][0].id, memories[1].id);
        assert_eq!(subsets[2][1].id, memories[5].id);
    }

    #[test]
    fn surplus_variants_get_empty_subsets() {
        let memories: Vec<MemoryRecord> = (0..2).map(record).collect();
        let subsets = round_robin_subsets(&memories, 4);
        assert_eq!(subsets.len(), 4);
        assert_eq!(subsets[0].len(), 1);
        assert_eq!(subsets[1].len(), 1);
        assert!(subsets[2].is_empty());
        assert!(subsets[3].is_empty());
    }
}
