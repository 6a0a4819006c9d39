//! Configuration for the ReasoningBank memory system.
//!
//! Loadable from TOML; every field has a serde default so partial files and
//! an empty file both produce a usable configuration.

use serde::{Deserialize, Serialize};

/// Top-level ReasoningBank configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankConfig {
    /// Embedding dimensionality settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Retrieval caps and defaults.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Consolidation thresholds.
    #[serde(default)]
    pub consolidation: ConsolidationConfig,
    /// Test-time scaling settings.
    #[serde(default)]
    pub matts: MattsConfig,
    /// Failure-to-memory extraction settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// LLM backend settings (consumed by the client crate).
    #[serde(default)]
    pub llm: LlmConfig,
    /// Persistence backend settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl BankConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BankError::Config`] if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::BankError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Embedding dimensionality, fixed per deployment and validated at insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Vector dimensionality D.
    #[serde(default = "default_768")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dimensions: 768 }
    }
}

/// Retrieval caps and code-generation defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Practical cap on bulk scans (consolidation, brute-force retrieval).
    #[serde(default = "default_10000")]
    pub scan_limit: usize,
    /// Default top-k for code-generation retrieval.
    #[serde(default = "default_5_usize")]
    pub code_generation_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            scan_limit: 10_000,
            code_generation_top_k: 5,
        }
    }
}

/// Thresholds driving the prune / merge / archive passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationConfig {
    /// Records with a success rate below this are prune candidates.
    #[serde(default = "default_0_30")]
    pub low_quality_threshold: f64,
    /// Minimum retrievals before a record can be pruned.
    #[serde(default = "default_10_u64")]
    pub min_retrievals_for_prune: u64,
    /// Cosine similarity at or above which two records are duplicates.
    #[serde(default = "default_0_95")]
    pub dup_similarity_threshold: f64,
    /// Days without a touch before a record is archived.
    #[serde(default = "default_90_i64")]
    pub stale_days: i64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            low_quality_threshold: 0.30,
            min_retrievals_for_prune: 10,
            dup_similarity_threshold: 0.95,
            stale_days: 90,
        }
    }
}

/// Memory-aware test-time scaling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MattsConfig {
    /// Whether parallel self-contrast is enabled.
    #[serde(default = "default_true")]
    pub parallel_enabled: bool,
    /// Whether sequential self-refinement is enabled.
    #[serde(default = "default_true")]
    pub sequential_enabled: bool,
    /// Default variant count N for parallel scaling.
    #[serde(default = "default_3_usize")]
    pub parallel_variants: usize,
    /// Default iteration cap for sequential scaling.
    #[serde(default = "default_3_usize")]
    pub sequential_iterations: usize,
    /// Minimum success rate filter for parallel memory retrieval.
    #[serde(default = "default_0_5")]
    pub parallel_min_success_rate: f64,
    /// Minimum success rate filter for sequential memory retrieval.
    #[serde(default = "default_0_6")]
    pub sequential_min_success_rate: f64,
    /// Memories retrieved per sequential iteration.
    #[serde(default = "default_5_usize")]
    pub sequential_top_k: usize,
    /// Score above which a successful sequential iteration stops early.
    #[serde(default = "default_0_9")]
    pub early_stop_score: f64,
}

impl Default for MattsConfig {
    fn default() -> Self {
        Self {
            parallel_enabled: true,
            sequential_enabled: true,
            parallel_variants: 3,
            sequential_iterations: 3,
            parallel_min_success_rate: 0.5,
            sequential_min_success_rate: 0.6,
            sequential_top_k: 5,
            early_stop_score: 0.9,
        }
    }
}

/// Failure-to-memory extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Sampling temperature for extraction calls.
    #[serde(default = "default_0_1_f32")]
    pub temperature: f32,
    /// Output-size cap for extraction calls.
    #[serde(default = "default_1024")]
    pub max_tokens: u32,
    /// Candidates accepted per extraction call; surplus is dropped.
    #[serde(default = "default_5_usize")]
    pub max_candidates_per_call: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 1024,
            max_candidates_per_call: 5,
        }
    }
}

/// LLM backend configuration, consumed by the HTTP client crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai", or "none".
    #[serde(default = "default_ollama")]
    pub provider: String,
    /// Base URL for the LLM API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// API key for OpenAI-compatible providers; unused by Ollama.
    #[serde(default)]
    pub api_key: String,
    /// Text-generation model name.
    #[serde(default = "default_gen_model")]
    pub model: String,
    /// Embedding model name.
    #[serde(default = "default_embed_model")]
    pub embedding_model: String,
    /// Hard timeout for any LLM call in milliseconds.
    #[serde(default = "default_5000")]
    pub request_timeout_ms: u64,
    /// Max retries before giving up on a call.
    #[serde(default = "default_2_u32")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            api_key: String::new(),
            model: "qwen2.5:7b-instruct".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            request_timeout_ms: 5000,
            max_retries: 2,
        }
    }
}

/// Persistence backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Backend: "sqlite" or "memory" (tests / ephemeral deployments).
    #[serde(default = "default_sqlite")]
    pub backend: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            wal_mode: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_ollama() -> String { "ollama".to_string() }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_gen_model() -> String { "qwen2.5:7b-instruct".to_string() }
fn default_embed_model() -> String { "nomic-embed-text".to_string() }
fn default_sqlite() -> String { "sqlite".to_string() }
fn default_0_1_f32() -> f32 { 0.1 }
fn default_0_30() -> f64 { 0.30 }
fn default_0_5() -> f64 { 0.5 }
fn default_0_6() -> f64 { 0.6 }
fn default_0_9() -> f64 { 0.9 }
fn default_0_95() -> f64 { 0.95 }
fn default_2_u32() -> u32 { 2 }
fn default_3_usize() -> usize { 3 }
fn default_5_usize() -> usize { 5 }
fn default_10_u64() -> u64 { 10 }
fn default_90_i64() -> i64 { 90 }
fn default_768() -> usize { 768 }
fn default_1024() -> u32 { 1024 }
fn default_5000() -> u64 { 5000 }
fn default_10000() -> usize { 10_000 }

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = BankConfig::from_toml("").expect("parse");
        assert_eq!(config.embedding.dimensions, 768);
        assert_eq!(config.retrieval.scan_limit, 10_000);
        assert!((config.consolidation.low_quality_threshold - 0.30).abs() < 1e-12);
        assert_eq!(config.consolidation.min_retrievals_for_prune, 10);
        assert!((config.consolidation.dup_similarity_threshold - 0.95).abs() < 1e-12);
        assert_eq!(config.consolidation.stale_days, 90);
        assert!(config.matts.parallel_enabled);
        assert_eq!(config.matts.parallel_variants, 3);
    }

    #[test]
    fn partial_toml_overrides_selected_fields() {
        let toml = r#"
            [embedding]
            dimensions = 384

            [matts]
            parallel_enabled = false
            parallel_variants = 8

            [consolidation]
            stale_days = 30
        "#;
        let config = BankConfig::from_toml(toml).expect("parse");
        assert_eq!(config.embedding.dimensions, 384);
        assert!(!config.matts.parallel_enabled);
        assert_eq!(config.matts.parallel_variants, 8);
        assert_eq!(config.consolidation.stale_days, 30);
        // Untouched sections stay at defaults.
        assert!(config.matts.sequential_enabled);
        assert_eq!(config.consolidation.min_retrievals_for_prune, 10);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = BankConfig::from_toml("not = [valid").expect_err("should fail");
        assert!(matches!(err, crate::BankError::Config(_)));
    }
}
