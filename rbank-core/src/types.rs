//! Core type definitions for the ReasoningBank memory system.
//!
//! All types are serializable; records crossing the repository boundary are
//! value snapshots, never shared references.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Unique identifier for a memory record, assigned by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random memory ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemoryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Embedding vector
// ---------------------------------------------------------------------------

/// A dense vector embedding for semantic similarity search.
///
/// The dimensionality D is fixed per deployment (typically 768) and enforced
/// at insert time by record validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Whether every component is a finite number.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|x| x.is_finite())
    }

    /// Cosine similarity to another embedding.
    ///
    /// Delegates to [`crate::vector::cosine_similarity`]; returns `0.0` on
    /// mismatched or degenerate inputs.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f64 {
        crate::vector::cosine_similarity(&self.0, &other.0)
    }
}

/// Which side of a retrieval pair a text is embedded as.
///
/// Asymmetric embedding models produce different vectors for stored
/// documents and for queries against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingKind {
    /// The text will be stored and matched against future queries.
    Document,
    /// The text is a query against stored documents.
    Query,
}

// ---------------------------------------------------------------------------
// Record enums
// ---------------------------------------------------------------------------

/// What kind of lesson a memory captures. Closed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    /// A code change was rejected in review.
    CodeRejection,
    /// A build or CI run failed.
    BuildFailure,
    /// A recurring error signature worth recognising early.
    ErrorPattern,
    /// A strategy that fixed a class of failures.
    FixStrategy,
    /// A pattern to follow (or avoid) when generating code.
    GenerationPattern,
    /// A general task-execution strategy.
    GeneralStrategy,
}

impl MemoryCategory {
    /// All categories, in declaration order.
    #[must_use]
    pub fn all() -> &'static [MemoryCategory] {
        &[
            Self::CodeRejection,
            Self::BuildFailure,
            Self::ErrorPattern,
            Self::FixStrategy,
            Self::GenerationPattern,
            Self::GeneralStrategy,
        ]
    }

    /// Whether this category is part of the build-related whitelist used by
    /// code-generation retrieval.
    #[must_use]
    pub fn is_build_related(self) -> bool {
        matches!(
            self,
            Self::BuildFailure | Self::ErrorPattern | Self::FixStrategy
        )
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CodeRejection => "code_rejection",
            Self::BuildFailure => "build_failure",
            Self::ErrorPattern => "error_pattern",
            Self::FixStrategy => "fix_strategy",
            Self::GenerationPattern => "generation_pattern",
            Self::GeneralStrategy => "general_strategy",
        };
        write!(f, "{name}")
    }
}

impl FromStr for MemoryCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "code_rejection" => Ok(Self::CodeRejection),
            "build_failure" => Ok(Self::BuildFailure),
            "error_pattern" => Ok(Self::ErrorPattern),
            "fix_strategy" => Ok(Self::FixStrategy),
            "generation_pattern" => Ok(Self::GenerationPattern),
            "general_strategy" => Ok(Self::GeneralStrategy),
            _ => Err(format!("unknown memory category: '{s}'")),
        }
    }
}

/// Provenance of a memory — which upstream event produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    /// Extracted from a rejected code change.
    BuildRejection,
    /// Extracted from a failed build.
    BuildFailure,
    /// Recorded after a task execution failed.
    TaskFailure,
    /// Recorded after a task execution succeeded.
    TaskSuccess,
    /// Recorded after a repair loop recovered from a failure.
    RepairSuccess,
}

impl fmt::Display for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BuildRejection => "build_rejection",
            Self::BuildFailure => "build_failure",
            Self::TaskFailure => "task_failure",
            Self::TaskSuccess => "task_success",
            Self::RepairSuccess => "repair_success",
        };
        write!(f, "{name}")
    }
}

impl FromStr for MemorySource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "build_rejection" => Ok(Self::BuildRejection),
            "build_failure" => Ok(Self::BuildFailure),
            "task_failure" => Ok(Self::TaskFailure),
            "task_success" => Ok(Self::TaskSuccess),
            "repair_success" => Ok(Self::RepairSuccess),
            _ => Err(format!("unknown memory source: '{s}'")),
        }
    }
}

/// Lifecycle status of a record. The only transition is `Active → Archived`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    /// Eligible for retrieval.
    Active,
    /// Excluded from retrieval; still addressable by id.
    Archived,
}

impl fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

impl FromStr for MemoryStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("unknown memory status: '{s}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Task & trajectory shapes (MaTTS boundary)
// ---------------------------------------------------------------------------

/// A task handed to the user-supplied executor. Opaque to the core except
/// for the fields used to build the retrieval query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Free-form task description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Template name, used as the query text when no description is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    /// Structured task parameters, serialized canonically (sorted keys) when
    /// building the retrieval query.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl TaskSpec {
    /// The text used to embed this task for memory retrieval:
    /// description (or template name) plus a canonical serialization of the
    /// parameters.
    #[must_use]
    pub fn query_text(&self) -> String {
        let head = self
            .description
            .as_deref()
            .or(self.template_name.as_deref())
            .unwrap_or("");
        if self.parameters.is_empty() {
            head.to_string()
        } else {
            // serde_json maps iterate in sorted key order, so this
            // serialization is canonical.
            let params =
                serde_json::to_string(&self.parameters).unwrap_or_default();
            format!("{head} {params}")
        }
    }

    /// Shallow field-override merge: fields present on the patch replace the
    /// same-named fields of this task.
    #[must_use]
    pub fn merged(&self, patch: &TaskPatch) -> TaskSpec {
        TaskSpec {
            description: patch
                .description
                .clone()
                .or_else(|| self.description.clone()),
            template_name: patch
                .template_name
                .clone()
                .or_else(|| self.template_name.clone()),
            parameters: patch
                .parameters
                .clone()
                .unwrap_or_else(|| self.parameters.clone()),
        }
    }
}

/// A partial task produced by a reflector; merged over the prior task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    /// Replacement description, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Replacement template name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    /// Replacement parameter map, if any (replaces the whole map).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Map<String, serde_json::Value>>,
}

/// The outcome of one executor invocation.
///
/// The trajectory scorer reads exactly these fields: `success`, `steps`,
/// `execution_time_ms`, `output_data` (distinct key count), and
/// `html_report` (length).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrajectoryResult {
    /// Whether the execution succeeded.
    pub success: bool,
    /// Number of steps the executor took, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    /// Wall-clock execution time in milliseconds, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    /// Structured output payload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data: Option<serde_json::Map<String, serde_json::Value>>,
    /// Rendered report, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_report: Option<String>,
    /// Error description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrajectoryResult {
    /// A failure wrapper carrying an error description. Used when an executor
    /// call errors out so callers always receive a well-defined result.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// The outcome of one reflector invocation in sequential scaling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reflection {
    /// Whether another refined iteration is worthwhile.
    pub should_refine: bool,
    /// Patch to merge over the prior task for the next iteration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined_task: Option<TaskPatch>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
