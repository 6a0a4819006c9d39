//! Trajectory scoring for test-time scaling.
//!
//! A pure function of the executor result — no I/O, fully deterministic —
//! used verbatim by both the parallel and sequential strategies:
//!
//! ```text
//! score = 0 if absent or failed, else
//!         0.5
//!       + 0.2 if steps < 10
//!       + 0.1 if execution_time_ms < 5000
//!       + 0.1 if output_data has more than 5 keys
//!       + 0.1 if html_report is longer than 1000 chars,
//!         clamped to 1.0
//! ```

use crate::types::TrajectoryResult;

/// Steps below this count earn the efficiency bonus.
const FAST_STEPS: u32 = 10;
/// Execution times below this (ms) earn the latency bonus.
const FAST_EXECUTION_MS: u64 = 5000;
/// Output payloads with more than this many keys earn the richness bonus.
const RICH_OUTPUT_KEYS: usize = 5;
/// Reports longer than this earn the report bonus.
const RICH_REPORT_CHARS: usize = 1000;

/// Score an execution result in `[0, 1]` from success, efficiency, and
/// richness.
#[must_use]
pub fn score_trajectory(result: Option<&TrajectoryResult>) -> f64 {
    let Some(result) = result else {
        return 0.0;
    };
    if !result.success {
        return 0.0;
    }

    let mut score: f64 = 0.5;
    if matches!(result.steps, Some(steps) if steps < FAST_STEPS) {
        score += 0.2;
    }
    if matches!(result.execution_time_ms, Some(ms) if ms < FAST_EXECUTION_MS) {
        score += 0.1;
    }
    if matches!(&result.output_data, Some(data) if data.len() > RICH_OUTPUT_KEYS) {
        score += 0.1;
    }
    if matches!(&result.html_report, Some(report) if report.len() > RICH_REPORT_CHARS) {
        score += 0.1;
    }

    score.min(1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output_with_keys(n: usize) -> serde_json::Map<String, serde_json::Value> {
        (0..n).map(|i| (format!("k{i}"), json!(i))).collect()
    }

    #[test]
    fn absent_result_scores_zero() {
        assert_eq!(score_trajectory(None), 0.0);
    }

    #[test]
    fn failed_result_scores_zero() {
        let result = TrajectoryResult {
            success: false,
            steps: Some(1),
            execution_time_ms: Some(10),
            output_data: Some(output_with_keys(10)),
            html_report: Some("x".repeat(5000)),
            error: None,
        };
        assert_eq!(score_trajectory(Some(&result)), 0.0);
    }

    #[test]
    fn bare_success_scores_base() {
        let result = TrajectoryResult {
            success: true,
            ..TrajectoryResult::default()
        };
        assert!((score_trajectory(Some(&result)) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn slow_success_scores_base() {
        let result = TrajectoryResult {
            success: true,
            execution_time_ms: Some(6000),
            ..TrajectoryResult::default()
        };
        assert!((score_trajectory(Some(&result)) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn fast_rich_success_scores_high() {
        let result = TrajectoryResult {
            success: true,
            steps: Some(5),
            execution_time_ms: Some(3000),
            output_data: Some(output_with_keys(6)),
            ..TrajectoryResult::default()
        };
        assert!((score_trajectory(Some(&result)) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn quick_success_scores_point_six() {
        let result = TrajectoryResult {
            success: true,
            execution_time_ms: Some(3000),
            ..TrajectoryResult::default()
        };
        assert!((score_trajectory(Some(&result)) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn all_bonuses_clamp_to_one() {
        let result = TrajectoryResult {
            success: true,
            steps: Some(1),
            execution_time_ms: Some(1),
            output_data: Some(output_with_keys(20)),
            html_report: Some("r".repeat(2000)),
            error: None,
        };
        assert!(score_trajectory(Some(&result)) <= 1.0);
    }

    #[test]
    fn boundary_values_earn_no_bonus() {
        // Exactly at the thresholds: no bonus.
        let result = TrajectoryResult {
            success: true,
            steps: Some(10),
            execution_time_ms: Some(5000),
            output_data: Some(output_with_keys(5)),
            html_report: Some("r".repeat(1000)),
            error: None,
        };
        assert!((score_trajectory(Some(&result)) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn adding_a_bonus_never_decreases_score() {
        let base = TrajectoryResult {
            success: true,
            ..TrajectoryResult::default()
        };
        let with_steps = TrajectoryResult {
            steps: Some(3),
            ..base.clone()
        };
        let with_more = TrajectoryResult {
            execution_time_ms: Some(100),
            ..with_steps.clone()
        };
        let s0 = score_trajectory(Some(&base));
        let s1 = score_trajectory(Some(&with_steps));
        let s2 = score_trajectory(Some(&with_more));
        assert!(s1 >= s0);
        assert!(s2 >= s1);
    }
}
