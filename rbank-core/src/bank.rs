//! The injectable context object that ties the core together.
//!
//! A [`ReasoningBank`] owns the repository and embedder handles plus the
//! configuration, and is constructed once at process start — components
//! receive it (or pieces of it) instead of reaching for hidden globals. It
//! also hosts the code-generation retrieval entry point.

use std::sync::Arc;

use tracing::debug;

use crate::config::BankConfig;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::metrics::BankCounters;
use crate::record::MemoryRecord;
use crate::repository::{MemoryRepository, RetrievalFilter};
use crate::types::EmbeddingKind;

/// Fewest build-related hits required before the build-focused result set is
/// preferred over the general one.
const MIN_BUILD_RELATED_HITS: usize = 2;

/// Shared handles and configuration for the ReasoningBank core.
pub struct ReasoningBank {
    repository: Arc<dyn MemoryRepository>,
    embedder: Arc<dyn Embedder>,
    config: BankConfig,
    counters: Arc<BankCounters>,
}

impl ReasoningBank {
    /// Assemble the bank from its capabilities.
    #[must_use]
    pub fn new(
        repository: Arc<dyn MemoryRepository>,
        embedder: Arc<dyn Embedder>,
        config: BankConfig,
    ) -> Self {
        Self {
            repository,
            embedder,
            config,
            counters: Arc::new(BankCounters::new()),
        }
    }

    /// The repository handle.
    #[must_use]
    pub fn repository(&self) -> Arc<dyn MemoryRepository> {
        Arc::clone(&self.repository)
    }

    /// The embedder handle.
    #[must_use]
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.embedder)
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &BankConfig {
        &self.config
    }

    /// The process-wide counter set.
    #[must_use]
    pub fn counters(&self) -> Arc<BankCounters> {
        Arc::clone(&self.counters)
    }

    /// Retrieve memories to seed code generation.
    ///
    /// Retrieves a general candidate pool for the task text (plus the file
    /// path when given) and prefers the build-related categories — build
    /// failures, error patterns, fix strategies — whenever at least two such
    /// hits are available; otherwise the general result set is returned.
    ///
    /// # Errors
    ///
    /// Propagates embedder and repository failures.
    pub async fn retrieve_for_code_generation(
        &self,
        task_description: &str,
        file_path: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<MemoryRecord>> {
        let query_text = match file_path {
            Some(path) => format!("{task_description}\nfile: {path}"),
            None => task_description.to_string(),
        };
        let query = self
            .embedder
            .embed(&query_text, EmbeddingKind::Query)
            .await?;

        // Over-fetch so the build-related subset has room to fill top_k.
        let pool = self
            .repository
            .retrieve_by_embedding(&query, top_k * 2, &RetrievalFilter::default())
            .await?;
        BankCounters::bump(&self.counters.retrievals);
        BankCounters::add(&self.counters.records_retrieved, pool.len() as u64);

        let build_related: Vec<MemoryRecord> = pool
            .iter()
            .filter(|r| r.category.is_build_related())
            .take(top_k)
            .cloned()
            .collect();

        if build_related.len() >= MIN_BUILD_RELATED_HITS {
            debug!(
                hits = build_related.len(),
                "preferring build-related memories for code generation"
            );
            return Ok(build_related);
        }

        Ok(pool.into_iter().take(top_k).collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
