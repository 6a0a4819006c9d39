//! # ReasoningBank Core Library
//!
//! A self-maintaining, embedding-indexed store of "reasoning memories" —
//! lessons distilled from rejected code changes and failed builds — together
//! with two memory-aware test-time-scaling (MaTTS) strategies that use the
//! store to improve downstream task execution:
//!
//! - **Memory store & index** — persistent, embedding-keyed records with
//!   success/retrieval statistics ([`MemoryRepository`]).
//! - **Consolidation** — a periodic maintenance pass that prunes low-quality
//!   memories, merges near-duplicates, and archives stale ones
//!   ([`ConsolidationEngine`]).
//! - **MaTTS** — parallel self-contrast ([`matts::ParallelScaling`]) and
//!   sequential self-refinement ([`matts::SequentialScaling`]) over an opaque
//!   task executor.
//! - **Extraction** — LLM-driven distillation of failures into validated,
//!   embedded memories ([`MemoryExtractor`]).
//!
//! The crate is a library boundary: it consumes four capabilities from its
//! environment ([`MemoryRepository`], [`Embedder`], [`TextGenerator`], and
//! `tracing` for structured logs) and has no wire protocol of its own.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bank;
pub mod config;
pub mod consolidation;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod matts;
pub mod metrics;
pub mod record;
pub mod repository;
pub mod scoring;
pub mod textgen;
pub mod types;
pub mod vector;

pub use bank::ReasoningBank;
pub use config::BankConfig;
pub use consolidation::{ConsolidationEngine, ConsolidationStats};
pub use embedding::Embedder;
pub use error::BankError;
pub use extract::MemoryExtractor;
pub use record::{MemoryDraft, MemoryRecord};
pub use repository::{MemoryRepository, RecordPatch, RetrievalFilter};
pub use textgen::TextGenerator;
pub use types::*;
