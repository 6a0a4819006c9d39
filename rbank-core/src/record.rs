//! The memory record entity and its validation rules.
//!
//! A [`MemoryRecord`] is the sole durable entity of the core. The repository
//! exclusively owns its persistent representation; callers receive value
//! snapshots, and every mutation goes back through repository operations.
//!
//! Invariants maintained here:
//! - `times_used_in_success + times_used_in_failure <= times_retrieved`
//! - `success_rate` equals successes over total outcomes, or `None` while no
//!   outcome has been recorded
//! - the embedding of an active record always has the configured
//!   dimensionality, with all components finite

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BankError, Result};
use crate::types::{Embedding, MemoryCategory, MemoryId, MemorySource, MemoryStatus};

/// A fully-populated memory record snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Repository-assigned stable identifier.
    pub id: MemoryId,
    /// Short human-readable title.
    pub title: String,
    /// One-sentence description.
    pub description: String,
    /// The actual lesson, multi-sentence.
    pub content: String,
    /// What kind of lesson this is.
    pub category: MemoryCategory,
    /// Which upstream event produced it.
    pub source: MemorySource,
    /// Embedding of `title + description + content`.
    pub embedding: Embedding,
    /// Incremented every time this record is returned by retrieval.
    pub times_retrieved: u64,
    /// Incremented when a retrieving trajectory succeeds.
    pub times_used_in_success: u64,
    /// Incremented when a retrieving trajectory fails.
    pub times_used_in_failure: u64,
    /// Successes over recorded outcomes; `None` until any outcome exists.
    pub success_rate: Option<f64>,
    /// Lifecycle status.
    pub status: MemoryStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Bumped on retrieval and on stat update.
    pub updated_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Build a record from a validated draft with zeroed statistics.
    #[must_use]
    pub fn from_draft(id: MemoryId, draft: MemoryDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            content: draft.content,
            category: draft.category,
            source: draft.source,
            embedding: draft.embedding,
            times_retrieved: 0,
            times_used_in_success: 0,
            times_used_in_failure: 0,
            success_rate: None,
            status: MemoryStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Recompute `success_rate` from the outcome counters.
    #[allow(clippy::cast_precision_loss)]
    pub fn recompute_success_rate(&mut self) {
        let total = self.times_used_in_success + self.times_used_in_failure;
        self.success_rate = if total == 0 {
            None
        } else {
            Some(self.times_used_in_success as f64 / total as f64)
        };
    }

    /// Record that this snapshot was returned by a retrieval.
    pub fn mark_retrieved(&mut self, now: DateTime<Utc>) {
        self.times_retrieved += 1;
        self.updated_at = now;
    }

    /// Record a success or failure outcome and refresh the rate.
    pub fn record_outcome(&mut self, succeeded: bool, now: DateTime<Utc>) {
        if succeeded {
            self.times_used_in_success += 1;
        } else {
            self.times_used_in_failure += 1;
        }
        self.recompute_success_rate();
        self.updated_at = now;
    }

    /// Fold a merged-away twin's counters into this record.
    pub fn absorb(&mut self, loser: &MemoryRecord, now: DateTime<Utc>) {
        self.times_retrieved += loser.times_retrieved;
        self.times_used_in_success += loser.times_used_in_success;
        self.times_used_in_failure += loser.times_used_in_failure;
        self.recompute_success_rate();
        self.updated_at = now;
    }

    /// Whether the record has gone untouched for longer than `stale_days`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, stale_days: i64) -> bool {
        let last_touch = self.updated_at.max(self.created_at);
        now.signed_duration_since(last_touch) > Duration::days(stale_days)
    }

    /// Check the statistical invariants of this snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`BankError::InvalidRecord`] when a counter or rate invariant
    /// is violated.
    pub fn check_stats(&self) -> Result<()> {
        let outcomes = self.times_used_in_success + self.times_used_in_failure;
        if outcomes > self.times_retrieved {
            return Err(BankError::InvalidRecord(format!(
                "outcome counts ({outcomes}) exceed retrieval count ({})",
                self.times_retrieved
            )));
        }
        match self.success_rate {
            None if outcomes > 0 => Err(BankError::InvalidRecord(
                "success rate missing despite recorded outcomes".to_string(),
            )),
            Some(rate) if !(0.0..=1.0).contains(&rate) => Err(BankError::InvalidRecord(
                format!("success rate {rate} outside [0, 1]"),
            )),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Draft (pre-insert shape)
// ---------------------------------------------------------------------------

/// A record as it arrives at `add`: fully populated except for the id and
/// statistics, which the repository assigns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryDraft {
    /// Short human-readable title.
    pub title: String,
    /// One-sentence description.
    pub description: String,
    /// The actual lesson.
    pub content: String,
    /// What kind of lesson this is.
    pub category: MemoryCategory,
    /// Which upstream event produced it.
    pub source: MemorySource,
    /// Embedding of the record text.
    pub embedding: Embedding,
}

impl MemoryDraft {
    /// Validate the draft against the deployment's embedding dimensionality.
    ///
    /// # Errors
    ///
    /// Returns [`BankError::InvalidRecord`] for missing text fields and
    /// [`BankError::InvalidEmbedding`] for a dimension mismatch or
    /// non-finite components.
    pub fn validate(&self, dimensions: usize) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(BankError::InvalidRecord("title is required".to_string()));
        }
        if self.description.trim().is_empty() {
            return Err(BankError::InvalidRecord(
                "description is required".to_string(),
            ));
        }
        if self.content.trim().is_empty() {
            return Err(BankError::InvalidRecord("content is required".to_string()));
        }
        validate_embedding(&self.embedding, dimensions)
    }
}

/// Validate an embedding's dimensionality and finiteness.
///
/// # Errors
///
/// Returns [`BankError::InvalidEmbedding`] on dimension mismatch and
/// [`BankError::InvalidRecord`] when a component is not finite.
pub fn validate_embedding(embedding: &Embedding, dimensions: usize) -> Result<()> {
    if embedding.dimensions() != dimensions {
        return Err(BankError::InvalidEmbedding {
            expected: dimensions,
            actual: embedding.dimensions(),
        });
    }
    if !embedding.is_finite() {
        return Err(BankError::InvalidRecord(
            "embedding contains non-finite components".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(dims: usize) -> MemoryDraft {
        MemoryDraft {
            title: "Avoid unwrap in async handlers".to_string(),
            description: "Unwrap in handlers was rejected twice in review".to_string(),
            content: "Propagate errors with ? instead of unwrapping; reviewers reject \
                      handler code that can panic on malformed input."
                .to_string(),
            category: MemoryCategory::CodeRejection,
            source: MemorySource::BuildRejection,
            embedding: Embedding(vec![0.5; dims]),
        }
    }

    #[test]
    fn valid_draft_passes() {
        assert!(draft(8).validate(8).is_ok());
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let err = draft(8).validate(16).expect_err("should fail");
        assert!(matches!(
            err,
            BankError::InvalidEmbedding {
                expected: 16,
                actual: 8
            }
        ));
    }

    #[test]
    fn non_finite_embedding_is_rejected() {
        let mut d = draft(4);
        d.embedding.0[2] = f32::NAN;
        assert!(d.validate(4).is_err());
    }

    #[test]
    fn empty_title_is_rejected() {
        let mut d = draft(4);
        d.title = "   ".to_string();
        assert!(d.validate(4).is_err());
    }

    #[test]
    fn success_rate_tracks_outcomes() {
        let now = Utc::now();
        let mut rec = MemoryRecord::from_draft(MemoryId::new(), draft(4), now);
        assert_eq!(rec.success_rate, None);

        rec.mark_retrieved(now);
        rec.mark_retrieved(now);
        rec.record_outcome(true, now);
        rec.record_outcome(false, now);

        let rate = rec.success_rate.expect("rate");
        assert!((rate - 0.5).abs() < 1e-12);
        rec.check_stats().expect("invariants hold");
    }

    #[test]
    fn absorb_folds_counters_and_recomputes() {
        let now = Utc::now();
        let mut winner = MemoryRecord::from_draft(MemoryId::new(), draft(4), now);
        winner.times_retrieved = 10;
        winner.times_used_in_success = 8;
        winner.times_used_in_failure = 2;
        winner.recompute_success_rate();

        let mut loser = MemoryRecord::from_draft(MemoryId::new(), draft(4), now);
        loser.times_retrieved = 5;
        loser.times_used_in_success = 1;
        loser.times_used_in_failure = 4;
        loser.recompute_success_rate();

        winner.absorb(&loser, now);
        assert_eq!(winner.times_retrieved, 15);
        assert_eq!(winner.times_used_in_success, 9);
        assert_eq!(winner.times_used_in_failure, 6);
        let rate = winner.success_rate.expect("rate");
        assert!((rate - 9.0 / 15.0).abs() < 1e-12);
        winner.check_stats().expect("invariants hold");
    }

    #[test]
    fn staleness_uses_latest_touch() {
        let now = Utc::now();
        let mut rec = MemoryRecord::from_draft(MemoryId::new(), draft(4), now);
        rec.created_at = now - Duration::days(200);
        rec.updated_at = now - Duration::days(100);
        assert!(rec.is_stale(now, 90));

        rec.updated_at = now - Duration::days(30);
        assert!(!rec.is_stale(now, 90));
    }
}
