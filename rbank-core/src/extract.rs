//! Failure → memory extraction.
//!
//! Turns rejected code changes and failed builds into validated, embedded
//! memory records: render a prompt, ask the text-generation capability for a
//! JSON array of candidate lessons, validate each candidate, embed it, and
//! persist it.
//!
//! The pipeline is deliberately lossy in the caller's favor: a bad candidate
//! is skipped with a warning, and a failed generation call or unparseable
//! response yields an empty list — the upstream rejection path must never
//! fail because learning failed.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::embedding::Embedder;
use crate::metrics::BankCounters;
use crate::record::{MemoryDraft, MemoryRecord};
use crate::repository::MemoryRepository;
use crate::textgen::{GenerationOptions, TextGenerator};
use crate::types::{EmbeddingKind, MemoryCategory, MemorySource};

/// Longest title accepted; longer candidate titles are truncated.
const MAX_TITLE_CHARS: usize = 80;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// A code change that was rejected upstream.
#[derive(Debug, Clone)]
pub struct RejectedChange {
    /// Path of the file the change touched.
    pub file_path: String,
    /// One-line summary of what the change attempted.
    pub summary: String,
    /// Excerpt of the change itself.
    pub diff_excerpt: String,
}

/// The outcome of a failed build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// The command that was run.
    pub command: String,
    /// Its exit code.
    pub exit_code: i32,
    /// The tail of the build log.
    pub log_tail: String,
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// Prompt for distilling lessons from a rejected code change.
pub const REJECTION_PROMPT: &str = r#"A proposed code change was rejected during review.

File: {file_path}
Change summary: {summary}
Rejection reason: {reason}

Change excerpt:
{diff_excerpt}

Distill up to {max_candidates} reusable lessons that would help avoid this
rejection in the future. Each lesson must be general enough to apply beyond
this one change.

Return ONLY a JSON array. Each element:
{{"title": "short imperative title", "description": "one sentence", "content": "2-4 sentences of actionable guidance", "category": "code_rejection|error_pattern|fix_strategy|generation_pattern|general_strategy"}}"#;

/// Prompt for distilling lessons from a failed build.
pub const BUILD_FAILURE_PROMPT: &str = r#"A build failed.

Command: {command}
Exit code: {exit_code}

Log tail:
{log_tail}

Distill up to {max_candidates} reusable lessons that would help diagnose or
avoid this class of build failure in the future.

Return ONLY a JSON array. Each element:
{{"title": "short imperative title", "description": "one sentence", "content": "2-4 sentences of actionable guidance", "category": "build_failure|error_pattern|fix_strategy|general_strategy"}}"#;

/// Simple `{key}` template interpolation.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

// ---------------------------------------------------------------------------
// JSON salvage
// ---------------------------------------------------------------------------

/// Pull a JSON array out of a model response.
///
/// Accepts a bare array, an array inside a fenced code block, or an array
/// embedded in surrounding prose (first `[` to last `]`).
#[must_use]
pub fn extract_json_array(text: &str) -> Option<Vec<serde_json::Value>> {
    let trimmed = text.trim();

    if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(trimmed) {
        return Some(values);
    }

    // Fenced code block, with or without a language tag.
    if let Some(open) = trimmed.find("```") {
        let after_fence = &trimmed[open + 3..];
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        if let Some(close) = after_fence[body_start..].find("```") {
            let body = &after_fence[body_start..body_start + close];
            if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(body.trim()) {
                return Some(values);
            }
        }
    }

    // Last resort: the outermost bracketed slice.
    let start = trimmed.find('[')?;
    let end = trimmed.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Vec<serde_json::Value>>(&trimmed[start..=end]).ok()
}

/// Candidate memory shape expected from the model.
#[derive(Debug, Deserialize)]
struct CandidateMemory {
    title: String,
    description: String,
    content: String,
    category: String,
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// LLM-driven extraction of lessons from failures.
pub struct MemoryExtractor {
    repository: Arc<dyn MemoryRepository>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn TextGenerator>,
    config: ExtractionConfig,
    counters: Arc<BankCounters>,
}

impl MemoryExtractor {
    /// Create a new extractor.
    #[must_use]
    pub fn new(
        repository: Arc<dyn MemoryRepository>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn TextGenerator>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            repository,
            embedder,
            generator,
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

    /// Extract and persist lessons from a rejected code change.
    ///
    /// Returns the persisted records; empty when generation or parsing
    /// failed — the rejection path must not fail because learning failed.
    pub async fn extract_from_rejection(
        &self,
        change: &RejectedChange,
        reason: &str,
    ) -> Vec<MemoryRecord> {
        let max = self.config.max_candidates_per_call.to_string();
        let prompt = render_template(
            REJECTION_PROMPT,
            &[
                ("file_path", change.file_path.as_str()),
                ("summary", change.summary.as_str()),
                ("reason", reason),
                ("diff_excerpt", change.diff_excerpt.as_str()),
                ("max_candidates", max.as_str()),
            ],
        );
        self.extract(&prompt, MemorySource::BuildRejection).await
    }

    /// Extract and persist lessons from a failed build.
    pub async fn extract_from_build_failure(&self, build: &BuildReport) -> Vec<MemoryRecord> {
        let exit_code = build.exit_code.to_string();
        let max = self.config.max_candidates_per_call.to_string();
        let prompt = render_template(
            BUILD_FAILURE_PROMPT,
            &[
                ("command", build.command.as_str()),
                ("exit_code", exit_code.as_str()),
                ("log_tail", build.log_tail.as_str()),
                ("max_candidates", max.as_str()),
            ],
        );
        self.extract(&prompt, MemorySource::BuildFailure).await
    }

    async fn extract(&self, prompt: &str, source: MemorySource) -> Vec<MemoryRecord> {
        BankCounters::bump(&self.counters.extraction_calls);
        let options = GenerationOptions {
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        BankCounters::bump(&self.counters.llm_calls);
        let response = match self.generator.generate(prompt, &options).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "extraction generation failed, learning nothing");
                return Vec::new();
            }
        };

        let Some(candidates) = extract_json_array(&response) else {
            warn!(response_len = response.len(), "no JSON array in extraction response");
            BankCounters::bump(&self.counters.llm_parse_failures);
            return Vec::new();
        };

        let mut accepted = Vec::new();
        for candidate in candidates
            .into_iter()
            .take(self.config.max_candidates_per_call)
        {
            match self.accept_candidate(candidate, source).await {
                Some(record) => accepted.push(record),
                None => {
                    BankCounters::bump(&self.counters.extraction_candidates_rejected);
                }
            }
        }

        info!(
            accepted = accepted.len(),
            source = %source,
            "extraction finished"
        );
        accepted
    }

    /// Validate, embed, and persist one candidate. `None` means the
    /// candidate was dropped; the reason has already been logged.
    async fn accept_candidate(
        &self,
        candidate: serde_json::Value,
        source: MemorySource,
    ) -> Option<MemoryRecord> {
        let candidate: CandidateMemory = match serde_json::from_value(candidate) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(error = %e, "candidate has wrong shape, skipping");
                return None;
            }
        };
        let category: MemoryCategory = match candidate.category.parse() {
            Ok(category) => category,
            Err(e) => {
                warn!(error = %e, "candidate category invalid, skipping");
                return None;
            }
        };

        let mut title = candidate.title.trim().to_string();
        if title.chars().count() > MAX_TITLE_CHARS {
            title = title.chars().take(MAX_TITLE_CHARS).collect();
        }

        let text = format!("{title} {} {}", candidate.description, candidate.content);
        let embedding = match self.embedder.embed(&text, EmbeddingKind::Document).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(error = %e, "candidate embedding failed, skipping");
                return None;
            }
        };

        let draft = MemoryDraft {
            title,
            description: candidate.description.trim().to_string(),
            content: candidate.content.trim().to_string(),
            category,
            source,
            embedding,
        };

        let id = match self.repository.add(draft).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "candidate failed validation or insert, skipping");
                return None;
            }
        };
        BankCounters::bump(&self.counters.memories_added);
        debug!(%id, category = %category, "candidate memory persisted");

        match self.repository.get(&id).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => None,
            Err(e) => {
                warn!(%id, error = %e, "failed to read back persisted candidate");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
