//! Embedding capability boundary.
//!
//! The core never generates embeddings itself; it calls an [`Embedder`]
//! supplied by the environment. An HTTP-backed implementation lives in the
//! companion client crate; this module ships two local implementations for
//! tests and embedding-free deployments.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::types::{Embedding, EmbeddingKind};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Generate vector embeddings from text.
///
/// Implementations must be `Send + Sync`; calls may suspend (HTTP round
/// trips). Failures surface as [`crate::BankError::Embedder`] and are
/// propagated by MaTTS (retrieval cannot proceed without a query vector) but
/// swallowed per-candidate by the extractor.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BankError::Embedder`] if the backend fails, or
    /// [`crate::BankError::InvalidEmbedding`] if it produces a vector of the
    /// wrong dimensionality.
    async fn embed(&self, text: &str, kind: EmbeddingKind) -> Result<Embedding>;

    /// The dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A human-readable name for the model.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Stub provider (tests & embedding-free deployments)
// ---------------------------------------------------------------------------

/// An embedder that returns zero-vectors. For unit tests that don't care
/// about similarity and for wiring checks.
pub struct StubEmbedder {
    dims: usize,
}

impl StubEmbedder {
    /// Create a new stub embedder with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, _text: &str, _kind: EmbeddingKind) -> Result<Embedding> {
        Ok(Embedding(vec![0.0; self.dims]))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "stub-zero-vector"
    }
}

// ---------------------------------------------------------------------------
// Deterministic hash provider (integration tests)
// ---------------------------------------------------------------------------

/// An embedder that derives a unit-length pseudo-embedding from a hash of
/// the input text.
///
/// The same text always produces the same vector, and distinct texts almost
/// always produce near-orthogonal vectors, which is exactly what integration
/// tests need: non-zero, diverse, reproducible embeddings with no model on
/// disk.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    /// Create a new deterministic embedder.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str, kind: EmbeddingKind) -> Result<Embedding> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        // Document and query embeddings of the same text must coincide here,
        // so the kind does not feed the seed.
        let _ = kind;
        let mut rng = StdRng::seed_from_u64(hasher.finish());

        let raw: Vec<f32> = (0..self.dims).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let mag: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag < f32::EPSILON {
            return Ok(Embedding(vec![0.0; self.dims]));
        }
        Ok(Embedding(raw.iter().map(|x| x / mag).collect()))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "deterministic-hash"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
