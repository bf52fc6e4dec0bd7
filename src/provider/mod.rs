//! Capability interfaces for embedding and text generation
//!
//! The retrieval core never depends on a concrete inference technology; it
//! consumes exactly two narrow contracts, implemented elsewhere (ONNX,
//! llama.cpp, remote APIs, test stubs). Implementations must be thread-safe:
//! the backend shares handles across concurrent operations and may swap them
//! at runtime.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding model not initialized: {0}")]
    NotInitialized(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generator not initialized: {0}")]
    NotInitialized(String),

    #[error("Text generation failed: {0}")]
    InferenceError(String),

    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),
}

/// Trait for embedding providers
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the text.
    ///
    /// Callers verify the returned length against their configured dimension.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embedding dimension (e.g. 384 for all-MiniLM-L6-v2)
    fn dimension(&self) -> usize;

    /// Whether the provider is initialized and ready for inference
    fn is_ready(&self) -> bool;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Generation parameters passed through to the generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: usize,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            stop_sequences: Vec::new(),
        }
    }
}

/// Generation result with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Generated text, or a descriptive message on failure
    pub text: String,
    pub tokens_generated: usize,
    pub prompt_tokens: usize,
    /// Whether generation ran to a natural stop
    pub finished: bool,
    /// "stop", "length", "cancelled" or "error"
    pub stop_reason: String,
    /// False on errors; expected failures are values, not panics
    pub success: bool,
    /// Retrieval metadata: sources, chunk counts, timings
    pub metadata: Value,
}

impl GenerationResult {
    /// Structured failure result carrying the error text
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            text: message.into(),
            tokens_generated: 0,
            prompt_tokens: 0,
            finished: false,
            stop_reason: "error".to_string(),
            success: false,
            metadata: Value::Null,
        }
    }
}

/// Trait for text generators
pub trait TextGenerator: Send + Sync {
    /// Generate text from a prompt
    fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResult, GenerationError>;

    /// Whether the generator is initialized and ready for inference
    fn is_ready(&self) -> bool;

    /// Generator name for logging
    fn name(&self) -> &str;
}
