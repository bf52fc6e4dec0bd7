//! Retrieval backend orchestrating chunking, embedding, indexing and
//! generation
//!
//! Owns a [`DocumentChunker`], a [`VectorStore`] and shared handles to the two
//! external capabilities. Two independent lock domains: the backend mutex
//! (config snapshot, capability handles, chunk-id counter) and the store's own
//! mutex. A call chain never holds both at once — the backend snapshots what
//! it needs, releases its lock, then delegates — so a provider hot-swap can
//! proceed concurrently with an in-flight search. A search started during a
//! swap may use the momentarily stale provider it snapshotted; that is a
//! documented relaxation, not a race.

use crate::chunker::DocumentChunker;
use crate::config::RetrievalConfig;
use crate::provider::{EmbeddingProvider, GenerationOptions, GenerationResult, TextGenerator};
use crate::store::{IndexedChunk, SearchResult, VectorStore};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};

const NO_CONTEXT_ANSWER: &str = "I don't have enough information to answer that question.";

/// Length of the document prefix attached to each chunk as provenance
const SOURCE_PREFIX_CHARS: usize = 100;

/// Mutable backend state guarded by the backend mutex
struct BackendState {
    config: RetrievalConfig,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    text_generator: Option<Arc<dyn TextGenerator>>,
    /// Counter behind the `chunk_<n>` ids; reset by `clear()`
    next_chunk_id: u64,
}

/// Everything `query` needs, captured under the lock in one shot
struct QuerySnapshot {
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    text_generator: Option<Arc<dyn TextGenerator>>,
    embedding_dimension: usize,
    similarity_threshold: f32,
    top_k: usize,
    max_context_tokens: usize,
    prompt_template: String,
}

/// End-to-end retrieval pipeline
pub struct RetrievalBackend {
    state: Mutex<BackendState>,
    store: VectorStore,
    chunker: DocumentChunker,
}

impl RetrievalBackend {
    /// Build a backend with its own store and chunker derived from the config
    pub fn new(config: RetrievalConfig) -> crate::Result<Self> {
        crate::config::ConfigValidator::validate(&config)?;

        let store = VectorStore::new(config.store_config());
        let chunker = DocumentChunker::new(config.chunker_config());

        info!(
            dimension = config.embedding_dimension,
            chunk_size = config.chunk_size,
            "Retrieval backend initialized"
        );

        Ok(Self {
            state: Mutex::new(BackendState {
                config,
                embedding_provider: None,
                text_generator: None,
                next_chunk_id: 0,
            }),
            store,
            chunker,
        })
    }

    /// Convenience constructor attaching both capabilities up front
    pub fn with_providers(
        config: RetrievalConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        text_generator: Arc<dyn TextGenerator>,
    ) -> crate::Result<Self> {
        let backend = Self::new(config)?;
        backend.set_embedding_provider(embedding_provider);
        backend.set_text_generator(text_generator);
        Ok(backend)
    }

    /// Atomically replace the embedding provider.
    ///
    /// Operations already holding a reference to the old provider keep it
    /// alive and functional until they complete.
    pub fn set_embedding_provider(&self, provider: Arc<dyn EmbeddingProvider>) {
        let mut state = self.state.lock().unwrap();
        if provider.is_ready() {
            state.config.embedding_dimension = provider.dimension();
            info!(
                name = provider.name(),
                dimension = provider.dimension(),
                "Set embedding provider"
            );
        }
        state.embedding_provider = Some(provider);
    }

    /// Atomically replace the text generator
    pub fn set_text_generator(&self, generator: Arc<dyn TextGenerator>) {
        let mut state = self.state.lock().unwrap();
        if generator.is_ready() {
            info!(name = generator.name(), "Set text generator");
        }
        state.text_generator = Some(generator);
    }

    /// Chunk, embed and index a document.
    ///
    /// Chunks whose embeddings come back with the wrong dimension are skipped
    /// and processing continues; false is returned only on structural failure
    /// (no ready embedding provider, or an embedding call erroring out).
    pub fn add_document(&self, text: &str, metadata: Value) -> bool {
        let (embedder, dimension) = {
            let state = self.state.lock().unwrap();
            (
                state.embedding_provider.clone(),
                state.config.embedding_dimension,
            )
        };

        let Some(embedder) = embedder.filter(|e| e.is_ready()) else {
            error!("Embedding provider not available");
            return false;
        };

        let chunks = self.chunker.chunk(text);
        info!(chunks = chunks.len(), "Split document into chunks");

        // Embed outside both locks; model inference dominates this path
        let mut embedded = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let embedding = match embedder.embed(&chunk.text) {
                Ok(embedding) => embedding,
                Err(e) => {
                    error!(error = %e, "Failed to embed chunk");
                    return false;
                }
            };

            if embedding.len() != dimension {
                warn!(
                    expected = dimension,
                    actual = embedding.len(),
                    "Embedding dimension mismatch; skipping chunk"
                );
                continue;
            }

            embedded.push((chunk.text.clone(), embedding));
        }

        if embedded.is_empty() {
            // Nothing to index (empty document, or every chunk skipped);
            // not a structural failure
            return true;
        }

        let source_prefix: String = text.chars().take(SOURCE_PREFIX_CHARS).collect();

        let indexed: Vec<IndexedChunk> = {
            let mut state = self.state.lock().unwrap();
            embedded
                .into_iter()
                .map(|(chunk_text, embedding)| {
                    let id = format!("chunk_{}", state.next_chunk_id);
                    state.next_chunk_id += 1;

                    let mut chunk_metadata = metadata.clone();
                    if !chunk_metadata.is_object() {
                        chunk_metadata = json!({});
                    }
                    chunk_metadata["source_text"] = Value::String(source_prefix.clone());

                    IndexedChunk {
                        id,
                        text: chunk_text,
                        embedding,
                        metadata: chunk_metadata,
                    }
                })
                .collect()
        };

        let count = indexed.len();
        if !self.store.add_chunks_batch(indexed) {
            error!("Failed to add chunks to vector store");
            return false;
        }

        info!(chunks = count, "Added document to index");
        true
    }

    /// Embed the query and retrieve the most similar chunks.
    ///
    /// Snapshots the provider and config under the backend lock, then embeds
    /// and searches without it.
    pub fn search(&self, query_text: &str, top_k: usize) -> Vec<SearchResult> {
        let (embedder, dimension, threshold) = {
            let state = self.state.lock().unwrap();
            (
                state.embedding_provider.clone(),
                state.config.embedding_dimension,
                state.config.similarity_threshold,
            )
        };

        self.search_with_provider(query_text, top_k, embedder, dimension, threshold)
    }

    fn search_with_provider(
        &self,
        query_text: &str,
        top_k: usize,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        dimension: usize,
        threshold: f32,
    ) -> Vec<SearchResult> {
        let Some(embedder) = embedder.filter(|e| e.is_ready()) else {
            error!("Embedding provider not available for search");
            return Vec::new();
        };

        let query_embedding = match embedder.embed(query_text) {
            Ok(embedding) => embedding,
            Err(e) => {
                error!(error = %e, "Query embedding failed");
                return Vec::new();
            }
        };

        if query_embedding.len() != dimension {
            error!(
                expected = dimension,
                actual = query_embedding.len(),
                "Query embedding dimension mismatch"
            );
            return Vec::new();
        }

        self.store.search(&query_embedding, top_k, threshold)
    }

    /// Answer a question grounded in the indexed documents.
    ///
    /// All expected failure modes come back as a structured result: missing
    /// capabilities and provider errors yield `success = false`; an empty
    /// retrieval yields `success = true` with a canned answer and
    /// `metadata.reason = "no_context"` — absence of matches is an expected
    /// outcome, not a failure.
    pub fn query(&self, question: &str, options: &GenerationOptions) -> GenerationResult {
        let snapshot = {
            let state = self.state.lock().unwrap();
            QuerySnapshot {
                embedding_provider: state.embedding_provider.clone(),
                text_generator: state.text_generator.clone(),
                embedding_dimension: state.config.embedding_dimension,
                similarity_threshold: state.config.similarity_threshold,
                top_k: state.config.top_k,
                max_context_tokens: state.config.max_context_tokens,
                prompt_template: state.config.prompt_template.clone(),
            }
        };

        if !snapshot
            .embedding_provider
            .as_ref()
            .is_some_and(|e| e.is_ready())
        {
            error!("Embedding provider not available for query");
            return GenerationResult::failure("Error: Embedding provider not available");
        }

        let Some(generator) = snapshot.text_generator.clone().filter(|g| g.is_ready()) else {
            error!("Text generator not available for query");
            return GenerationResult::failure("Error: Text generator not available");
        };

        let retrieval_start = Instant::now();
        let search_results = self.search_with_provider(
            question,
            snapshot.top_k,
            snapshot.embedding_provider,
            snapshot.embedding_dimension,
            snapshot.similarity_threshold,
        );
        let retrieval_ms = retrieval_start.elapsed().as_secs_f64() * 1000.0;

        if search_results.is_empty() {
            debug!("No relevant chunks found for query");
            return GenerationResult {
                text: NO_CONTEXT_ANSWER.to_string(),
                tokens_generated: 0,
                prompt_tokens: 0,
                finished: true,
                stop_reason: "stop".to_string(),
                success: true,
                metadata: json!({ "reason": "no_context" }),
            };
        }

        let context = self.build_context(&search_results, snapshot.max_context_tokens);
        info!(
            chunks = search_results.len(),
            chars = context.len(),
            "Built context from retrieved chunks"
        );

        let prompt = format_prompt(&snapshot.prompt_template, question, &context);

        let generation_start = Instant::now();
        let mut result = match generator.generate(&prompt, options) {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Generation failed");
                return GenerationResult::failure(format!("Error: {}", e));
            }
        };
        let generation_ms = generation_start.elapsed().as_secs_f64() * 1000.0;

        if result.success {
            let sources: Vec<Value> = search_results
                .iter()
                .map(|r| {
                    let mut source = json!({ "id": r.id, "score": r.similarity });
                    if let Some(prefix) = r.metadata.get("source_text") {
                        source["source"] = prefix.clone();
                    }
                    source
                })
                .collect();

            if !result.metadata.is_object() {
                result.metadata = json!({});
            }
            result.metadata["num_chunks"] = json!(search_results.len());
            result.metadata["context_length"] = json!(context.len());
            result.metadata["sources"] = Value::Array(sources);
            result.metadata["retrieval_time_ms"] = json!(retrieval_ms);
            result.metadata["generation_time_ms"] = json!(generation_ms);
        }

        result
    }

    /// Concatenate retrieved chunk texts, blank-line separated, in result
    /// order, stopping once the estimated token count would exceed the
    /// context budget. Always keeps at least the top chunk.
    fn build_context(&self, results: &[SearchResult], max_context_tokens: usize) -> String {
        let mut context = String::new();
        let mut tokens = 0;

        for (i, result) in results.iter().enumerate() {
            let chunk_tokens = self.chunker.estimate_tokens(&result.text);
            if i > 0 && tokens + chunk_tokens > max_context_tokens {
                debug!(
                    included = i,
                    budget = max_context_tokens,
                    "Context budget reached; truncating"
                );
                break;
            }

            if i > 0 {
                context.push_str("\n\n");
            }
            context.push_str(&result.text);
            tokens += chunk_tokens;
        }

        context
    }

    /// Empty the store and reset the chunk-id counter
    pub fn clear(&self) {
        self.store.clear();
        self.state.lock().unwrap().next_chunk_id = 0;
    }

    /// Number of indexed chunks
    pub fn document_count(&self) -> usize {
        self.store.size()
    }

    /// Store statistics merged with a snapshot of the current config
    pub fn get_statistics(&self) -> Value {
        let mut stats = self.store.get_statistics();

        let state = self.state.lock().unwrap();
        stats["config"] = json!({
            "embedding_dimension": state.config.embedding_dimension,
            "top_k": state.config.top_k,
            "similarity_threshold": state.config.similarity_threshold,
            "max_context_tokens": state.config.max_context_tokens,
            "chunk_size": state.config.chunk_size,
            "chunk_overlap": state.config.chunk_overlap,
        });

        stats
    }

    /// Direct access to the underlying store, for persistence
    pub fn store(&self) -> &VectorStore {
        &self.store
    }
}

/// Substitute `{context}` and then `{query}` at their first occurrence
fn format_prompt(template: &str, query: &str, context: &str) -> String {
    template
        .replacen("{context}", context, 1)
        .replacen("{query}", query, 1)
}
