//! Text-generation capability boundary.
//!
//! Used only by the extractor. The HTTP-backed implementation lives in the
//! companion client crate; [`NullGenerator`] stands in when no backend is
//! configured, so the extractor degrades to "learned nothing" instead of
//! failing its caller.

use async_trait::async_trait;

use crate::error::{BankError, Result};

/// Sampling options for a generation call.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Sampling temperature (0.0 = deterministic).
    pub temperature: f32,
    /// Output-size cap in tokens.
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 256,
        }
    }
}

/// Generate text from a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`BankError::Generation`] if the backend is unavailable or
    /// the call fails after retries.
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String>;
}

/// A generator with no backend. Every call fails cleanly, which upstream
/// extraction treats as "no candidates".
pub struct NullGenerator;

#[async_trait]
impl TextGenerator for NullGenerator {
    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
        Err(BankError::Generation(
            "no text-generation backend configured".to_string(),
        ))
    }
}
