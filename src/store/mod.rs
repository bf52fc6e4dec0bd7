//! ANN vector store over chunk embeddings
//!
//! Architecture:
//! - [`VectorStore`]: HNSW index plus the metadata needed to turn index hits
//!   back into chunk content, behind a single mutex
//! - Internal keys are monotonically increasing and never reused within a
//!   store's lifetime, so a stale index entry can never alias another chunk's
//!   metadata after churn
//! - Persistence: binary index snapshot plus a JSON metadata sidecar

mod vector_store;

pub use vector_store::{VectorStore, VectorStoreError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document chunk stored in the vector index.
///
/// Immutable once inserted; an update is a remove followed by an insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    /// Stable, externally meaningful chunk identifier
    pub id: String,
    /// Chunk text content
    pub text: String,
    /// Embedding vector; length must equal the store's configured dimension
    pub embedding: Vec<f32>,
    /// Arbitrary structured metadata carried through to search results
    pub metadata: Value,
}

/// Search result with similarity score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Chunk identifier
    pub id: String,
    /// Chunk text content
    pub text: String,
    /// Cosine similarity (0.0 to 1.0, higher is more similar)
    pub similarity: f32,
    /// Chunk metadata
    pub metadata: Value,
}
