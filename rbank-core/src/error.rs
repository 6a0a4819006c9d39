//! Error types for the ReasoningBank core library.

use thiserror::Error;

/// Top-level error type for all ReasoningBank operations.
#[derive(Error, Debug)]
pub enum BankError {
    /// A record failed validation at insert or update time.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// An embedding did not match the configured dimensionality.
    #[error("Invalid embedding: expected {expected} dimensions, got {actual}")]
    InvalidEmbedding {
        /// Dimensions the deployment is configured for.
        expected: usize,
        /// Dimensions actually supplied.
        actual: usize,
    },

    /// A memory with the given ID was not found.
    #[error("Memory not found: {0}")]
    NotFound(crate::MemoryId),

    /// The backing store could not be reached or refused the operation.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The embedding capability failed.
    #[error("Embedder error: {0}")]
    Embedder(String),

    /// The text-generation capability failed.
    #[error("Text generation error: {0}")]
    Generation(String),

    /// A user-supplied executor or reflector failed.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, BankError>;
