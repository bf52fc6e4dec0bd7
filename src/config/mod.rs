//! Configuration for the retrieval core
//!
//! All knobs are plain serde structs with defaults matching the shipped
//! on-device configuration. A config is an immutable snapshot: the backend
//! replaces it wholesale, it never mutates individual fields in place.

use crate::error::{RaglineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod validator;

pub use validator::ConfigValidator;

/// Default prompt template; `{context}` and `{query}` are each substituted
/// once at their first occurrence.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Context:\n{context}\n\nQuestion: {query}\n\nAnswer:";

/// Retrieval pipeline configuration consumed by [`crate::RetrievalBackend`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Embedding dimension (384 for all-MiniLM-L6-v2 class models)
    pub embedding_dimension: usize,
    /// Number of top chunks to retrieve per query
    pub top_k: usize,
    /// Minimum similarity threshold requested by the caller (0.0-1.0)
    pub similarity_threshold: f32,
    /// Maximum tokens of retrieved context assembled into the prompt
    pub max_context_tokens: usize,
    /// Approximate tokens per chunk when splitting documents
    pub chunk_size: usize,
    /// Overlap tokens between consecutive chunks
    pub chunk_overlap: usize,
    /// Prompt template with `{context}` and `{query}` placeholders
    pub prompt_template: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedding_dimension: 384,
            top_k: 3,
            similarity_threshold: 0.7,
            max_context_tokens: 2048,
            chunk_size: 512,
            chunk_overlap: 50,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

/// Document chunker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Approximate tokens per chunk
    pub chunk_size: usize,
    /// Overlap tokens between chunks
    pub chunk_overlap: usize,
    /// Rough characters-per-token estimate used instead of a real tokenizer
    pub chars_per_token: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            chars_per_token: 4,
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Embedding dimension
    pub dimension: usize,
    /// Capacity hint for the index
    pub max_elements: usize,
    /// HNSW connectivity (M, graph fan-out per layer)
    pub connectivity: usize,
    /// Construction-time search depth (recall vs. build latency)
    pub expansion_add: usize,
    /// Query-time search depth (recall vs. query latency)
    pub expansion_search: usize,
    /// Practical ceiling applied to caller-supplied similarity thresholds.
    ///
    /// Dense sentence embeddings rarely score above 0.3-0.5 for natural
    /// questions, so an overly strict requested threshold would suppress all
    /// results. Tunable because it is calibrated to the embedding model
    /// family plugged in, not a universal constant.
    pub threshold_ceiling: f32,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            max_elements: 100_000,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
            threshold_ceiling: 0.15,
        }
    }
}

impl RetrievalConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RaglineError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RaglineError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let config: RetrievalConfig = toml::from_str(&content)?;

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RaglineError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Derive the chunker configuration for this pipeline
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            ..ChunkerConfig::default()
        }
    }

    /// Derive the vector store configuration for this pipeline
    pub fn store_config(&self) -> VectorStoreConfig {
        VectorStoreConfig {
            dimension: self.embedding_dimension,
            ..VectorStoreConfig::default()
        }
    }
}
