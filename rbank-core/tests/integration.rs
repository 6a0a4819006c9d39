//! Integration tests — end-to-end flows across the core.
//!
//! Failure → extraction → retrieval → scaling → consolidation, on the
//! durable SQLite backend where it matters.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use rbank_core::bank::ReasoningBank;
use rbank_core::config::{BankConfig, ConsolidationConfig, ExtractionConfig, MattsConfig};
use rbank_core::consolidation::ConsolidationEngine;
use rbank_core::embedding::{Embedder, HashEmbedder};
use rbank_core::extract::{BuildReport, MemoryExtractor};
use rbank_core::matts::{ParallelScaling, TaskExecutor};
use rbank_core::record::{MemoryDraft, MemoryRecord};
use rbank_core::repository::{MemoryRepository, RetrievalFilter, SqliteRepository};
use rbank_core::textgen::{GenerationOptions, TextGenerator};
use rbank_core::types::{
    EmbeddingKind, MemoryCategory, MemoryId, MemorySource, MemoryStatus, TaskSpec,
    TrajectoryResult,
};

const DIMS: usize = 32;

struct CannedGenerator(String);

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> rbank_core::error::Result<String> {
        Ok(self.0.clone())
    }
}

struct AlwaysSucceeds;

#[async_trait]
impl TaskExecutor for AlwaysSucceeds {
    async fn execute(
        &self,
        _task: &TaskSpec,
        _memories: &[MemoryRecord],
    ) -> rbank_core::error::Result<TrajectoryResult> {
        Ok(TrajectoryResult {
            success: true,
            steps: Some(3),
            execution_time_ms: Some(1200),
            ..TrajectoryResult::default()
        })
    }
}

async fn seeded_record(
    embedder_text: &str,
    category: MemoryCategory,
    times_retrieved: u64,
    successes: u64,
    failures: u64,
) -> MemoryRecord {
    let now = Utc::now();
    let embedding = HashEmbedder::new(DIMS)
        .embed(embedder_text, EmbeddingKind::Document)
        .await
        .expect("embed");
    let mut record = MemoryRecord::from_draft(
        MemoryId::new(),
        MemoryDraft {
            title: format!("lesson on {embedder_text}"),
            description: "one line".to_string(),
            content: "the body".to_string(),
            category,
            source: MemorySource::TaskFailure,
            embedding,
        },
        now,
    );
    record.times_retrieved = times_retrieved;
    record.times_used_in_success = successes;
    record.times_used_in_failure = failures;
    record.recompute_success_rate();
    record
}

// ---------------------------------------------------------------------------
// Failure → extraction → code-generation retrieval
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lessons_flow_from_build_failure_to_code_generation() {
    let repo = Arc::new(SqliteRepository::open_in_memory(DIMS).expect("open"));
    let repo_dyn: Arc<dyn MemoryRepository> = repo.clone();
    let embedder = Arc::new(HashEmbedder::new(DIMS));
    let embedder_dyn: Arc<dyn Embedder> = embedder.clone();

    let response = r#"[
      {"title": "Pin the linker version", "description": "Linker drift broke the build.", "content": "Pin the toolchain in CI so linker upgrades cannot break release builds.", "category": "build_failure"},
      {"title": "Treat missing symbols as dependency skew", "description": "Undefined symbols usually mean skew.", "content": "Check for mismatched crate versions before touching code.", "category": "error_pattern"}
    ]"#;

    let extractor = MemoryExtractor::new(
        Arc::clone(&repo_dyn),
        Arc::clone(&embedder_dyn),
        Arc::new(CannedGenerator(response.to_string())),
        ExtractionConfig::default(),
    );

    let learned = extractor
        .extract_from_build_failure(&BuildReport {
            command: "cargo build --release".to_string(),
            exit_code: 1,
            log_tail: "undefined symbols for architecture".to_string(),
        })
        .await;
    assert_eq!(learned.len(), 2);
    assert!(learned.iter().all(|r| r.source == MemorySource::BuildFailure));

    // Both lessons are build-related, so code-generation retrieval prefers
    // them as a set.
    let bank = ReasoningBank::new(repo_dyn, embedder_dyn, BankConfig::default());
    let hits = bank
        .retrieve_for_code_generation("Pin the linker version", None, 5)
        .await
        .expect("retrieve");
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|r| r.category.is_build_related()));

    // Retrieval left its mark on the statistics.
    let reread = repo.get(&learned[0].id).await.expect("get").expect("found");
    assert!(reread.times_retrieved >= 1);
}

// ---------------------------------------------------------------------------
// Retrieval purity (ordering, cap, filters, archived exclusion)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retrieval_is_pure_over_a_mixed_store() {
    let repo = SqliteRepository::open_in_memory(DIMS).expect("open");

    for i in 0..8_u64 {
        let record =
            seeded_record(&format!("topic {i}"), MemoryCategory::GeneralStrategy, 10, i, 10 - i)
                .await;
        repo.insert_snapshot(&record).expect("seed");
    }
    let mut archived = seeded_record("topic 3", MemoryCategory::GeneralStrategy, 10, 9, 1).await;
    archived.status = MemoryStatus::Archived;
    repo.insert_snapshot(&archived).expect("seed");

    let query = HashEmbedder::new(DIMS)
        .embed("topic 3", EmbeddingKind::Query)
        .await
        .expect("embed");
    let filter = RetrievalFilter {
        min_success_rate: Some(0.4),
        categories: None,
    };
    let hits = repo
        .retrieve_by_embedding(&query, 4, &filter)
        .await
        .expect("retrieve");

    assert!(hits.len() <= 4);
    assert!(hits.iter().all(|r| r.status == MemoryStatus::Active));
    assert!(hits
        .iter()
        .all(|r| r.success_rate.is_none() || r.success_rate.expect("rate") >= 0.4));

    // Sorted by decreasing similarity.
    let sims: Vec<f64> = hits
        .iter()
        .map(|r| query.cosine_similarity(&r.embedding))
        .collect();
    for pair in sims.windows(2) {
        assert!(pair[0] >= pair[1] - 1e-9, "similarity order violated: {sims:?}");
    }
    // The archived twin of the best match never surfaces.
    assert!(hits.iter().all(|r| r.id != archived.id));
}

// ---------------------------------------------------------------------------
// Consolidation on the durable backend
// ---------------------------------------------------------------------------

#[tokio::test]
async fn consolidation_runs_idempotently_on_sqlite() {
    let repo = Arc::new(SqliteRepository::open_in_memory(DIMS).expect("open"));
    let repo_dyn: Arc<dyn MemoryRepository> = repo.clone();
    let now = Utc::now();

    // Prunable: judged often, keeps failing.
    repo.insert_snapshot(&seeded_record("prunable", MemoryCategory::ErrorPattern, 10, 1, 9).await)
        .expect("seed");
    // Duplicate twins sharing one embedding text.
    repo.insert_snapshot(&seeded_record("twin", MemoryCategory::FixStrategy, 10, 8, 2).await)
        .expect("seed");
    repo.insert_snapshot(&seeded_record("twin", MemoryCategory::FixStrategy, 5, 3, 2).await)
        .expect("seed");
    // Stale: untouched for 120 days.
    let mut stale = seeded_record("stale", MemoryCategory::GeneralStrategy, 0, 0, 0).await;
    stale.created_at = now - Duration::days(120);
    stale.updated_at = now - Duration::days(120);
    repo.insert_snapshot(&stale).expect("seed");

    let engine = ConsolidationEngine::new(repo_dyn, ConsolidationConfig::default(), 10_000);

    let first = engine.consolidate().await;
    assert!(first.success);
    assert_eq!(first.total_memories_before, 4);
    assert_eq!(first.pruned, 1);
    assert_eq!(first.merged, 1);
    assert_eq!(first.archived, 1);

    // Survivor carries the folded statistics.
    let survivors = repo.scan_all(10).await.expect("scan");
    assert_eq!(survivors.len(), 1);
    let twin = &survivors[0];
    assert_eq!(twin.times_retrieved, 15);
    assert_eq!(twin.times_used_in_success, 11);
    twin.check_stats().expect("invariants hold");

    let second = engine.consolidate().await;
    assert!(second.success);
    assert_eq!(second.pruned + second.merged + second.archived, 0);
}

// ---------------------------------------------------------------------------
// Parallel scaling against the durable backend
// ---------------------------------------------------------------------------

#[tokio::test]
async fn parallel_scaling_records_winner_outcomes() {
    let repo = Arc::new(SqliteRepository::open_in_memory(DIMS).expect("open"));
    let repo_dyn: Arc<dyn MemoryRepository> = repo.clone();
    for i in 0..3_u64 {
        repo.insert_snapshot(
            &seeded_record(
                &format!("deploy step {i}"),
                MemoryCategory::GeneralStrategy,
                10,
                8 + i,
                2 - i.min(2),
            )
            .await,
        )
        .expect("seed");
    }

    let scaling = ParallelScaling::new(
        repo_dyn,
        Arc::new(HashEmbedder::new(DIMS)),
        MattsConfig::default(),
    );
    let task = TaskSpec {
        description: Some("deploy the service".to_string()),
        ..TaskSpec::default()
    };

    let result = scaling
        .run(&task, Arc::new(AlwaysSucceeds), 3)
        .await
        .expect("run");
    assert!(result.success);

    // Exactly one memory — the winning variant's seed — got credited.
    let records = repo.scan_all(10).await.expect("scan");
    let credited: u64 = records.iter().map(|r| r.times_used_in_success).sum();
    let seeded: u64 = 8 + 9 + 10;
    assert_eq!(credited, seeded + 1, "one memory credited with the win");
    for record in &records {
        record.check_stats().expect("invariants hold");
    }
}
