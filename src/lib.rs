//! Ragline - On-Device Retrieval Core
//!
//! The retrieval layer of a Retrieval-Augmented Generation pipeline: splits
//! documents into overlapping chunks, indexes their embeddings for approximate
//! nearest-neighbor search, and at query time retrieves the most relevant
//! chunks to ground a downstream text-generation call. Embedding and
//! generation models are supplied externally through the capability traits in
//! [`provider`]; this crate never depends on a concrete inference technology.

pub mod backend;
pub mod chunker;
pub mod config;
pub mod error;
pub mod provider;
pub mod store;

pub use backend::RetrievalBackend;
pub use chunker::{DocumentChunker, TextChunk};
pub use config::{ChunkerConfig, RetrievalConfig, VectorStoreConfig};
pub use error::{RaglineError, Result, ValidationError};
pub use provider::{
    EmbeddingError, EmbeddingProvider, GenerationError, GenerationOptions, GenerationResult,
    TextGenerator,
};
pub use store::{IndexedChunk, SearchResult, VectorStore, VectorStoreError};
