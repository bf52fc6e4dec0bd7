use crate::config::VectorStoreConfig;
use crate::store::{IndexedChunk, SearchResult};
use ahash::{AHashMap, AHashSet};
use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Index file not found: {0}")]
    IndexNotFound(PathBuf),

    #[error("Metadata sidecar not found: {0}")]
    SidecarNotFound(PathBuf),

    #[error("Index and sidecar disagree: {0}")]
    Inconsistent(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index serialization error: {0}")]
    Snapshot(#[from] bincode::Error),

    #[error("Metadata serialization error: {0}")]
    Sidecar(#[from] serde_json::Error),
}

/// Binary snapshot of the live vectors, written next to the sidecar.
#[derive(Serialize, Deserialize)]
struct IndexSnapshot {
    dimension: usize,
    vectors: Vec<(usize, Vec<f32>)>,
}

/// One sidecar entry per live chunk.
#[derive(Serialize, Deserialize)]
struct SidecarChunk {
    key: usize,
    #[serde(flatten)]
    chunk: IndexedChunk,
}

/// Sidecar JSON capturing everything needed to reconstruct identity mappings.
#[derive(Serialize, Deserialize)]
struct Sidecar {
    next_key: usize,
    chunks: Vec<SidecarChunk>,
}

const MAX_LAYER: usize = 16;

struct StoreInner {
    index: Hnsw<'static, f32, DistCosine>,
    /// Internal key -> chunk; the key space is disjoint from chunk ids
    chunks: AHashMap<usize, IndexedChunk>,
    id_to_key: AHashMap<String, usize>,
    /// Keys whose chunks were removed. The HNSW graph cannot drop nodes
    /// without breaking proximity edges, so removed keys stay in the graph
    /// and are filtered out of search results.
    retired: AHashSet<usize>,
    /// Monotonically increasing; never reused until `clear()`
    next_key: usize,
}

/// ANN vector store under cosine similarity.
///
/// One mutex guards the index and both identity maps; every public operation
/// holds it for its full duration. Acceptable because graph traversal, not
/// the lock, dominates each operation's cost.
pub struct VectorStore {
    inner: Mutex<StoreInner>,
    config: VectorStoreConfig,
}

impl VectorStore {
    pub fn new(config: VectorStoreConfig) -> Self {
        let index = Self::build_index(&config);
        info!(
            dimension = config.dimension,
            max_elements = config.max_elements,
            connectivity = config.connectivity,
            "Created vector store"
        );

        Self {
            inner: Mutex::new(StoreInner {
                index,
                chunks: AHashMap::new(),
                id_to_key: AHashMap::new(),
                retired: AHashSet::new(),
                next_key: 0,
            }),
            config,
        }
    }

    fn build_index(config: &VectorStoreConfig) -> Hnsw<'static, f32, DistCosine> {
        Hnsw::<f32, DistCosine>::new(
            config.connectivity,
            config.max_elements,
            MAX_LAYER,
            config.expansion_add,
            DistCosine,
        )
    }

    /// Add a chunk to the index.
    ///
    /// Returns false without mutation if the embedding length does not match
    /// the configured dimension or the id is already present.
    pub fn add_chunk(&self, chunk: IndexedChunk) -> bool {
        let mut inner = self.inner.lock().unwrap();
        Self::insert_locked(&mut inner, &self.config, chunk)
    }

    /// Add multiple chunks, continuing past individual failures.
    ///
    /// Returns true iff at least one insertion succeeded; partial success is
    /// normal, not exceptional.
    pub fn add_chunks_batch(&self, chunks: Vec<IndexedChunk>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let mut any_added = false;

        for chunk in chunks {
            any_added |= Self::insert_locked(&mut inner, &self.config, chunk);
        }

        any_added
    }

    fn insert_locked(
        inner: &mut StoreInner,
        config: &VectorStoreConfig,
        chunk: IndexedChunk,
    ) -> bool {
        if chunk.embedding.len() != config.dimension {
            warn!(
                id = %chunk.id,
                expected = config.dimension,
                actual = chunk.embedding.len(),
                "Rejecting chunk with invalid embedding dimension"
            );
            return false;
        }

        if inner.id_to_key.contains_key(&chunk.id) {
            warn!(id = %chunk.id, "Rejecting duplicate chunk id");
            return false;
        }

        let key = inner.next_key;
        inner.next_key += 1;

        inner.index.insert((&chunk.embedding, key));
        inner.id_to_key.insert(chunk.id.clone(), key);
        inner.chunks.insert(key, chunk);

        true
    }

    /// Search for the `top_k` most similar chunks.
    ///
    /// The caller-supplied threshold is capped at the configured ceiling (see
    /// [`VectorStoreConfig::threshold_ceiling`]) before filtering. Never
    /// fails: dimension mismatch or an empty index degrade to an empty result.
    pub fn search(&self, query_embedding: &[f32], top_k: usize, threshold: f32) -> Vec<SearchResult> {
        let inner = self.inner.lock().unwrap();

        if query_embedding.len() != self.config.dimension {
            warn!(
                expected = self.config.dimension,
                actual = query_embedding.len(),
                "Invalid query embedding dimension"
            );
            return Vec::new();
        }

        if inner.chunks.is_empty() || top_k == 0 {
            return Vec::new();
        }

        // Over-fetch by the retired count so soft-deleted graph nodes cannot
        // crowd live chunks out of the top-k
        let fetch = top_k + inner.retired.len();
        let ef_search = self.config.expansion_search.max(fetch);
        let matches = inner.index.search(query_embedding, fetch, ef_search);

        debug!(
            matches = matches.len(),
            total = inner.chunks.len(),
            "ANN search returned candidates"
        );

        let effective_threshold = threshold.min(self.config.threshold_ceiling);

        let mut results = Vec::with_capacity(matches.len().min(top_k));
        for neighbour in matches {
            if results.len() == top_k {
                break;
            }

            let key = neighbour.d_id;
            // HNSW cosine distance is 1 - cosine_similarity
            let similarity = 1.0 - neighbour.distance;

            if similarity < effective_threshold {
                continue;
            }

            if inner.retired.contains(&key) {
                continue;
            }

            let Some(chunk) = inner.chunks.get(&key) else {
                // Key present in the graph but unknown to the metadata map:
                // recoverable integrity fault, skip and keep the other results
                warn!(key, "Index key has no metadata entry; skipping result");
                continue;
            };

            results.push(SearchResult {
                id: chunk.id.clone(),
                text: chunk.text.clone(),
                similarity,
                metadata: chunk.metadata.clone(),
            });
        }

        results
    }

    /// Remove a chunk by id. The internal key is permanently retired.
    pub fn remove_chunk(&self, chunk_id: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();

        let Some(key) = inner.id_to_key.remove(chunk_id) else {
            return false;
        };

        inner.chunks.remove(&key);
        inner.retired.insert(key);
        debug!(id = %chunk_id, key, "Retired chunk");

        true
    }

    /// Remove every chunk and reset the key counter: a fresh store.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.index = Self::build_index(&self.config);
        inner.chunks.clear();
        inner.id_to_key.clear();
        inner.retired.clear();
        inner.next_key = 0;
        info!("Cleared vector store");
    }

    /// Number of live chunks
    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Estimated memory footprint in bytes (graph nodes, embeddings, text)
    pub fn memory_usage(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        self.estimate_memory(&inner)
    }

    fn estimate_memory(&self, inner: &StoreInner) -> usize {
        let graph_nodes = inner.chunks.len() + inner.retired.len();
        let graph_bytes =
            graph_nodes * (self.config.dimension * 4 + self.config.connectivity * 2 * 8);
        let chunk_bytes: usize = inner
            .chunks
            .values()
            .map(|c| c.embedding.len() * 4 + c.text.len() + c.id.len())
            .sum();
        graph_bytes + chunk_bytes
    }

    /// Read-only introspection snapshot
    pub fn get_statistics(&self) -> serde_json::Value {
        let inner = self.inner.lock().unwrap();
        serde_json::json!({
            "num_chunks": inner.chunks.len(),
            "retired_keys": inner.retired.len(),
            "next_key": inner.next_key,
            "dimension": self.config.dimension,
            "memory_bytes": self.estimate_memory(&inner),
            "connectivity": self.config.connectivity,
            "max_elements": self.config.max_elements,
        })
    }

    /// Persist the index snapshot at `path` and the metadata sidecar at
    /// `path + ".metadata.json"`.
    pub fn save(&self, path: &Path) -> Result<(), VectorStoreError> {
        let inner = self.inner.lock().unwrap();

        let snapshot = IndexSnapshot {
            dimension: self.config.dimension,
            vectors: inner
                .chunks
                .iter()
                .map(|(&key, chunk)| (key, chunk.embedding.clone()))
                .collect(),
        };
        let index_file = BufWriter::new(File::create(path)?);
        bincode::serialize_into(index_file, &snapshot)?;

        let sidecar = Sidecar {
            next_key: inner.next_key,
            chunks: inner
                .chunks
                .iter()
                .map(|(&key, chunk)| SidecarChunk {
                    key,
                    chunk: chunk.clone(),
                })
                .collect(),
        };
        let sidecar_path = Self::sidecar_path(path);
        let mut sidecar_file = BufWriter::new(File::create(&sidecar_path)?);
        serde_json::to_writer(&mut sidecar_file, &sidecar)?;
        sidecar_file.flush()?;

        info!(
            path = %path.display(),
            chunks = sidecar.chunks.len(),
            next_key = sidecar.next_key,
            "Saved vector store"
        );
        Ok(())
    }

    /// Load a previously saved store, replacing the current contents.
    ///
    /// Both the index snapshot and the sidecar must be present and mutually
    /// consistent. The key counter is restored exactly so no future key can
    /// collide with a persisted one.
    pub fn load(&self, path: &Path) -> Result<(), VectorStoreError> {
        if !path.exists() {
            return Err(VectorStoreError::IndexNotFound(path.to_path_buf()));
        }
        let sidecar_path = Self::sidecar_path(path);
        if !sidecar_path.exists() {
            return Err(VectorStoreError::SidecarNotFound(sidecar_path));
        }

        let snapshot: IndexSnapshot =
            bincode::deserialize_from(BufReader::new(File::open(path)?))?;
        let sidecar: Sidecar =
            serde_json::from_reader(BufReader::new(File::open(&sidecar_path)?))?;

        if snapshot.dimension != self.config.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.config.dimension,
                actual: snapshot.dimension,
            });
        }

        if snapshot.vectors.len() != sidecar.chunks.len() {
            return Err(VectorStoreError::Inconsistent(format!(
                "snapshot has {} vectors, sidecar has {} chunks",
                snapshot.vectors.len(),
                sidecar.chunks.len()
            )));
        }

        let mut chunks = AHashMap::with_capacity(sidecar.chunks.len());
        let mut id_to_key = AHashMap::with_capacity(sidecar.chunks.len());

        for entry in sidecar.chunks {
            if entry.key >= sidecar.next_key {
                return Err(VectorStoreError::Inconsistent(format!(
                    "chunk key {} is not below next_key {}",
                    entry.key, sidecar.next_key
                )));
            }
            if entry.chunk.embedding.len() != self.config.dimension {
                return Err(VectorStoreError::InvalidDimension {
                    expected: self.config.dimension,
                    actual: entry.chunk.embedding.len(),
                });
            }
            if id_to_key.insert(entry.chunk.id.clone(), entry.key).is_some() {
                return Err(VectorStoreError::Inconsistent(format!(
                    "duplicate chunk id in sidecar: {}",
                    entry.chunk.id
                )));
            }
            chunks.insert(entry.key, entry.chunk);
        }

        let index = Self::build_index(&self.config);
        for (key, embedding) in &snapshot.vectors {
            if !chunks.contains_key(key) {
                return Err(VectorStoreError::Inconsistent(format!(
                    "snapshot key {} has no sidecar entry",
                    key
                )));
            }
            index.insert((embedding, *key));
        }

        let mut inner = self.inner.lock().unwrap();
        inner.index = index;
        inner.chunks = chunks;
        inner.id_to_key = id_to_key;
        inner.retired.clear();
        inner.next_key = sidecar.next_key;

        info!(
            path = %path.display(),
            chunks = inner.chunks.len(),
            next_key = inner.next_key,
            "Loaded vector store"
        );
        Ok(())
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut os = path.as_os_str().to_os_string();
        os.push(".metadata.json");
        PathBuf::from(os)
    }
}
