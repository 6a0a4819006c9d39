//! HTTP embedding client.
//!
//! Implements the core's [`Embedder`] capability against Ollama's
//! `/api/embeddings` endpoint or an OpenAI-compatible `/v1/embeddings`
//! endpoint, validating the dimensionality of every response before it
//! reaches the store.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use rbank_core::config::LlmConfig;
use rbank_core::embedding::Embedder;
use rbank_core::error::BankError;
use rbank_core::types::{Embedding, EmbeddingKind};

use crate::client::LlmProvider;
use crate::error::LlmError;

/// Embedder backed by an HTTP embedding endpoint.
pub struct HttpEmbedder {
    provider: LlmProvider,
    http: Client,
    model: String,
    dims: usize,
    timeout_ms: u64,
}

impl HttpEmbedder {
    /// Create a new HTTP embedder expecting vectors of `dimensions`.
    #[must_use]
    pub fn new(
        provider: LlmProvider,
        model: impl Into<String>,
        dimensions: usize,
        timeout_ms: u64,
    ) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            dims: dimensions,
            timeout_ms,
        }
    }

    /// Create an embedder from the core configuration.
    #[must_use]
    pub fn from_config(config: &LlmConfig, dimensions: usize) -> Self {
        Self::new(
            LlmProvider::from_config(config),
            config.embedding_model.clone(),
            dimensions,
            config.request_timeout_ms,
        )
    }

    async fn embed_ollama(&self, base_url: &str, text: &str) -> Result<Vec<f32>, LlmError> {
        let url = format!("{base_url}/api/embeddings");
        let body = json!({ "model": self.model, "prompt": text });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e, self.timeout_ms))?;
        if !resp.status().is_success() {
            return Err(LlmError::RequestFailed(format!("HTTP {}", resp.status())));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;
        parse_vector(&json["embedding"])
    }

    async fn embed_openai(
        &self,
        base_url: &str,
        api_key: &str,
        text: &str,
    ) -> Result<Vec<f32>, LlmError> {
        let url = format!("{base_url}/v1/embeddings");
        let body = json!({ "model": self.model, "input": text });

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(&e, self.timeout_ms))?;
        if !resp.status().is_success() {
            return Err(LlmError::RequestFailed(format!("HTTP {}", resp.status())));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;
        parse_vector(&json["data"][0]["embedding"])
    }
}

fn parse_vector(value: &serde_json::Value) -> Result<Vec<f32>, LlmError> {
    rbank_core::vector::unwrap_vector(value)
        .ok_or_else(|| LlmError::ParseError("response carried no embedding vector".to_string()))
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(
        &self,
        text: &str,
        kind: EmbeddingKind,
    ) -> rbank_core::error::Result<Embedding> {
        // The endpoints embed symmetrically; kind is accepted for interface
        // parity with asymmetric providers.
        let _ = kind;

        let result = match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable(
                "no embedding provider configured".to_string(),
            )),
            LlmProvider::Ollama { base_url } => self.embed_ollama(base_url, text).await,
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                self.embed_openai(base_url, api_key, text).await
            }
        };

        let vector = match result {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "embedding call failed");
                return Err(BankError::Embedder(e.to_string()));
            }
        };

        if vector.len() != self.dims {
            return Err(BankError::InvalidEmbedding {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        debug!(dims = vector.len(), "embedding produced");
        Ok(Embedding(vector))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
