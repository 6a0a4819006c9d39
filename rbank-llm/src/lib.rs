//! # rbank-llm — HTTP capability clients for the ReasoningBank core
//!
//! Implements the core's [`rbank_core::TextGenerator`] and
//! [`rbank_core::Embedder`] capabilities over HTTP:
//!
//! - **Ollama** (local, recommended default)
//! - **OpenAI-compatible APIs** (also works with Anthropic, Together, etc.)
//! - **None** — no backend; every call fails cleanly, which the extractor
//!   treats as "learned nothing"
//!
//! All calls honor a hard timeout and a bounded retry loop; exhausted
//! retries surface the last transport error.

pub mod client;
pub mod embedder;
pub mod error;

pub use client::{LlmClient, LlmProvider};
pub use embedder::HttpEmbedder;
pub use error::LlmError;
