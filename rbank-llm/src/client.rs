//! Text-generation client — unified interface for Ollama and
//! OpenAI-compatible backends.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use rbank_core::config::LlmConfig;
use rbank_core::error::BankError;
use rbank_core::textgen::{GenerationOptions, TextGenerator};

use crate::error::LlmError;

/// Provider backend for text generation and embeddings.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally (recommended).
    Ollama {
        /// Base URL, e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible API (also works with Anthropic, Together, etc.).
    OpenAiCompatible {
        /// Base URL, e.g. `https://api.openai.com`.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No backend — all calls return an error, so callers degrade cleanly.
    None,
}

impl LlmProvider {
    /// Build a provider from the core configuration.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        match config.provider.as_str() {
            "ollama" => Self::Ollama {
                base_url: config.base_url.clone(),
            },
            "openai" => Self::OpenAiCompatible {
                base_url: config.base_url.clone(),
                api_key: config.api_key.clone(),
            },
            _ => Self::None,
        }
    }
}

/// The text-generation client.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    model: String,
    max_retries: u32,
    timeout_ms: u64,
}

impl LlmClient {
    /// Create a new client.
    #[must_use]
    pub fn new(
        provider: LlmProvider,
        model: impl Into<String>,
        max_retries: u32,
        timeout_ms: u64,
    ) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_retries,
            timeout_ms,
        }
    }

    /// Create a client from the core configuration.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            LlmProvider::from_config(config),
            config.model.clone(),
            config.max_retries,
            config.request_timeout_ms,
        )
    }

    /// Create a client with no backend (all calls fail → caller fallback).
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, String::new(), 0, 0)
    }

    /// Whether a backend is configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    async fn generate_ollama(
        &self,
        base_url: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        let url = format!("{base_url}/api/generate");
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
            }
        });

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("retrying generation (attempt {}/{})", attempt + 1, self.max_retries + 1);
            }

            let start = Instant::now();
            let result = self
                .http
                .post(&url)
                .json(&body)
                .timeout(Duration::from_millis(self.timeout_ms))
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let json: serde_json::Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    let text = json["response"].as_str().unwrap_or("").to_string();
                    debug!(
                        latency_ms = start.elapsed().as_millis() as u64,
                        chars = text.len(),
                        "generation succeeded"
                    );
                    return Ok(text);
                }
                Ok(resp) => {
                    last_error = format!("HTTP {}", resp.status());
                    warn!("ollama returned error: {last_error}");
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() {
                        warn!("ollama request timed out after {}ms", self.timeout_ms);
                    } else {
                        warn!("ollama request failed: {last_error}");
                    }
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    async fn generate_openai(
        &self,
        base_url: &str,
        api_key: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        let url = format!("{base_url}/v1/chat/completions");
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt },
            ],
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        });

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("retrying generation (attempt {}/{})", attempt + 1, self.max_retries + 1);
            }

            let result = self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {api_key}"))
                .json(&body)
                .timeout(Duration::from_millis(self.timeout_ms))
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let json: serde_json::Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    let text = json["choices"][0]["message"]["content"]
                        .as_str()
                        .unwrap_or("")
                        .to_string();
                    return Ok(text);
                }
                Ok(resp) => {
                    last_error = format!("HTTP {}", resp.status());
                    warn!("openai-compatible API returned error: {last_error}");
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!("openai-compatible API request failed: {last_error}");
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> rbank_core::error::Result<String> {
        let result = match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable(
                "no LLM provider configured".to_string(),
            )),
            LlmProvider::Ollama { base_url } => {
                self.generate_ollama(base_url, prompt, options).await
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                self.generate_openai(base_url, api_key, prompt, options).await
            }
        };
        result.map_err(|e| BankError::Generation(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
