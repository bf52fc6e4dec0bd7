//! End-to-end backend tests: ingest, query, and provider hot-swap under
//! concurrency

use ragline::provider::{
    EmbeddingError, EmbeddingProvider, GenerationError, GenerationOptions, GenerationResult,
    TextGenerator,
};
use ragline::{RetrievalBackend, RetrievalConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;

const DIM: usize = 8;

/// Deterministic embedder: the vector direction follows the text's dominant
/// word so related texts land near each other
struct HashEmbedder;

impl EmbeddingProvider for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut v = vec![0.05; DIM];
        for word in text.split_whitespace() {
            let axis = word.len() % DIM;
            v[axis] += 1.0;
        }
        Ok(v)
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "hash-embedder"
    }
}

struct TemplateGenerator;

impl TextGenerator for TemplateGenerator {
    fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResult, GenerationError> {
        Ok(GenerationResult {
            text: "Grounded answer.".to_string(),
            tokens_generated: 3,
            prompt_tokens: prompt.len() / 4,
            finished: true,
            stop_reason: "stop".to_string(),
            success: true,
            metadata: json!({"max_tokens": options.max_tokens}),
        })
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "template-generator"
    }
}

fn backend() -> RetrievalBackend {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let config = RetrievalConfig {
        embedding_dimension: DIM,
        top_k: 3,
        similarity_threshold: 0.0,
        chunk_size: 32,
        chunk_overlap: 4,
        ..RetrievalConfig::default()
    };
    RetrievalBackend::with_providers(config, Arc::new(HashEmbedder), Arc::new(TemplateGenerator))
        .unwrap()
}

#[test]
fn ingest_then_query_returns_cited_answer() {
    let backend = backend();

    assert!(backend.add_document(
        "The warehouse inventory system tracks pallets. Each pallet has a barcode. \
         Barcodes are scanned at every dock door.",
        json!({"title": "inventory"}),
    ));
    assert!(backend.document_count() >= 1);

    let result = backend.query("How are pallets tracked?", &GenerationOptions::default());
    assert!(result.success);
    assert_eq!(result.text, "Grounded answer.");

    let sources = result.metadata["sources"].as_array().unwrap();
    assert!(!sources.is_empty());
    for source in sources {
        assert!(source["id"].as_str().unwrap().starts_with("chunk_"));
        assert!(source["score"].as_f64().is_some());
    }
    assert!(result.metadata["generation_time_ms"].as_f64().is_some());
}

#[test]
fn query_on_empty_index_is_a_successful_no_context_answer() {
    let backend = backend();

    let result = backend.query("Anything at all?", &GenerationOptions::default());
    assert!(result.success);
    assert_eq!(result.metadata["reason"], "no_context");
}

#[test]
fn searches_observe_documents_added_before_them() {
    let backend = backend();
    backend.add_document("Solar panels generate electricity from sunlight.", Value::Null);
    backend.add_document("Wind turbines convert kinetic energy into power.", Value::Null);

    let results = backend.search("electricity from panels", 3);
    assert!(!results.is_empty());
    for pair in results.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
}

#[test]
fn concurrent_search_and_provider_swap() {
    let backend = Arc::new(backend());
    assert!(backend.add_document("hello world", Value::Null));

    let searcher = {
        let backend = Arc::clone(&backend);
        thread::spawn(move || {
            for _ in 0..1000 {
                let _ = backend.search("hello", 1);
            }
        })
    };

    let swapper = {
        let backend = Arc::clone(&backend);
        thread::spawn(move || {
            for _ in 0..1000 {
                backend.set_embedding_provider(Arc::new(HashEmbedder));
            }
        })
    };

    searcher.join().expect("search thread panicked");
    swapper.join().expect("swap thread panicked");
}

#[test]
fn concurrent_ingest_and_query() {
    let backend = Arc::new(backend());
    backend.add_document("Seed document about shipping containers.", Value::Null);

    let writer = {
        let backend = Arc::clone(&backend);
        thread::spawn(move || {
            for i in 0..50 {
                backend.add_document(
                    &format!("Document number {} about container logistics.", i),
                    Value::Null,
                );
            }
        })
    };

    let reader = {
        let backend = Arc::clone(&backend);
        thread::spawn(move || {
            for _ in 0..200 {
                let _ = backend.query("container logistics", &GenerationOptions::default());
            }
        })
    };

    writer.join().expect("writer thread panicked");
    reader.join().expect("reader thread panicked");

    assert!(backend.document_count() >= 51);
}

#[test]
fn generator_swap_takes_effect_for_later_queries() {
    struct OtherGenerator;
    impl TextGenerator for OtherGenerator {
        fn generate(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<GenerationResult, GenerationError> {
            Ok(GenerationResult {
                text: "Different answer.".to_string(),
                tokens_generated: 2,
                prompt_tokens: 0,
                finished: true,
                stop_reason: "stop".to_string(),
                success: true,
                metadata: Value::Null,
            })
        }
        fn is_ready(&self) -> bool {
            true
        }
        fn name(&self) -> &str {
            "other-generator"
        }
    }

    let backend = backend();
    backend.add_document("Facts about harbor cranes and loading.", Value::Null);

    let before = backend.query("harbor cranes", &GenerationOptions::default());
    assert_eq!(before.text, "Grounded answer.");

    backend.set_text_generator(Arc::new(OtherGenerator));
    let after = backend.query("harbor cranes", &GenerationOptions::default());
    assert_eq!(after.text, "Different answer.");
}

#[test]
fn backend_round_trips_through_store_persistence() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("retrieval.idx");

    let first = backend();
    first.add_document("Forklifts move pallets between racks.", Value::Null);
    first.store().save(&path).unwrap();

    let second = backend();
    second.store().load(&path).unwrap();

    let results = second.search("pallets between racks", 3);
    assert!(!results.is_empty());
    assert!(results[0].text.contains("Forklifts"));
}
