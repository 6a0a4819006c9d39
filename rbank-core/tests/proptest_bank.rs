//! Property-based tests for the ReasoningBank core.
//!
//! Verifies the statistical, vector-math, and scoring invariants under
//! random inputs rather than hand-picked cases.

use proptest::prelude::*;

use chrono::Utc;
use rbank_core::record::{MemoryDraft, MemoryRecord};
use rbank_core::scoring::score_trajectory;
use rbank_core::types::{
    Embedding, MemoryCategory, MemoryId, MemorySource, TrajectoryResult,
};
use rbank_core::vector::cosine_similarity;

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_vector(len: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-1000.0..1000.0_f32, len)
}

fn arb_result() -> impl Strategy<Value = TrajectoryResult> {
    (
        any::<bool>(),
        prop::option::of(0..100_u32),
        prop::option::of(0..20_000_u64),
        prop::option::of(0..12_usize),
        prop::option::of(0..3000_usize),
    )
        .prop_map(|(success, steps, time, keys, report)| TrajectoryResult {
            success,
            steps,
            execution_time_ms: time,
            output_data: keys.map(|n| {
                (0..n)
                    .map(|i| (format!("k{i}"), serde_json::json!(i)))
                    .collect()
            }),
            html_report: report.map(|n| "r".repeat(n)),
            error: None,
        })
}

fn fresh_record() -> MemoryRecord {
    MemoryRecord::from_draft(
        MemoryId::new(),
        MemoryDraft {
            title: "t".to_string(),
            description: "d".to_string(),
            content: "c".to_string(),
            category: MemoryCategory::GeneralStrategy,
            source: MemorySource::TaskFailure,
            embedding: Embedding(vec![1.0, 0.0]),
        },
        Utc::now(),
    )
}

// ---------------------------------------------------------------------------
// Property: cosine similarity is bounded and total
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn cosine_always_in_unit_interval(
        a in arb_vector(16),
        b in arb_vector(16),
    ) {
        let sim = cosine_similarity(&a, &b);
        prop_assert!(sim >= -1.0, "similarity {sim} below -1");
        prop_assert!(sim <= 1.0, "similarity {sim} above 1");
    }
}

proptest! {
    #[test]
    fn cosine_mismatched_lengths_is_zero(
        a in arb_vector(8),
        b in arb_vector(12),
    ) {
        prop_assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}

proptest! {
    #[test]
    fn cosine_self_similarity_is_one_for_nonzero(v in arb_vector(16)) {
        let magnitude: f64 = v.iter().map(|x| f64::from(*x) * f64::from(*x)).sum::<f64>().sqrt();
        prop_assume!(magnitude > 1e-3);
        let sim = cosine_similarity(&v, &v);
        prop_assert!((sim - 1.0).abs() < 1e-6, "self-similarity {sim} != 1");
    }
}

// ---------------------------------------------------------------------------
// Property: scorer stays in [0, 1] and zeroes failures
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn score_always_in_unit_interval(result in arb_result()) {
        let score = score_trajectory(Some(&result));
        prop_assert!((0.0..=1.0).contains(&score), "score {score} out of bounds");
        if !result.success {
            prop_assert_eq!(score, 0.0);
        }
    }
}

proptest! {
    #[test]
    fn adding_fields_never_decreases_score(result in arb_result()) {
        // Removing any single positive-contributing field must not raise the
        // score; equivalently, a present field never hurts.
        let score = score_trajectory(Some(&result));

        let mut stripped = result.clone();
        stripped.steps = None;
        prop_assert!(score_trajectory(Some(&stripped)) <= score);

        let mut stripped = result.clone();
        stripped.output_data = None;
        prop_assert!(score_trajectory(Some(&stripped)) <= score);

        let mut stripped = result.clone();
        stripped.html_report = None;
        prop_assert!(score_trajectory(Some(&stripped)) <= score);
    }
}

// ---------------------------------------------------------------------------
// Property: statistics invariants survive arbitrary operation sequences
// ---------------------------------------------------------------------------

/// Operations a record sees over its life, as retrieval and outcome events.
#[derive(Debug, Clone)]
enum StatOp {
    Retrieve,
    Outcome(bool),
}

fn arb_ops() -> impl Strategy<Value = Vec<StatOp>> {
    prop::collection::vec(
        prop_oneof![
            2 => Just(StatOp::Retrieve),
            1 => any::<bool>().prop_map(StatOp::Outcome),
        ],
        0..60,
    )
}

proptest! {
    #[test]
    fn stats_invariant_holds_after_any_sequence(ops in arb_ops()) {
        let now = Utc::now();
        let mut record = fresh_record();

        for op in ops {
            match op {
                StatOp::Retrieve => record.mark_retrieved(now),
                StatOp::Outcome(succeeded) => {
                    // An outcome only makes sense for a retrieved record;
                    // the repository enforces this pairing, so mirror it.
                    if record.times_used_in_success + record.times_used_in_failure
                        < record.times_retrieved
                    {
                        record.record_outcome(succeeded, now);
                    }
                }
            }

            let outcomes = record.times_used_in_success + record.times_used_in_failure;
            prop_assert!(outcomes <= record.times_retrieved);
            match record.success_rate {
                None => prop_assert_eq!(outcomes, 0),
                Some(rate) => {
                    prop_assert!(outcomes > 0);
                    let expected = record.times_used_in_success as f64 / outcomes as f64;
                    prop_assert!((rate - expected).abs() < 1e-12);
                }
            }
        }
    }
}

proptest! {
    #[test]
    fn absorb_preserves_invariants(
        a_counts in (0..50_u64, 0..25_u64, 0..25_u64),
        b_counts in (0..50_u64, 0..25_u64, 0..25_u64),
    ) {
        let now = Utc::now();

        let mut a = fresh_record();
        a.times_retrieved = a_counts.0 + a_counts.1 + a_counts.2;
        a.times_used_in_success = a_counts.1;
        a.times_used_in_failure = a_counts.2;
        a.recompute_success_rate();

        let mut b = fresh_record();
        b.times_retrieved = b_counts.0 + b_counts.1 + b_counts.2;
        b.times_used_in_success = b_counts.1;
        b.times_used_in_failure = b_counts.2;
        b.recompute_success_rate();

        a.absorb(&b, now);
        prop_assert!(a.check_stats().is_ok());
        prop_assert_eq!(
            a.times_used_in_success,
            a_counts.1 + b_counts.1
        );
    }
}
