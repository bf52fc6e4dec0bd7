//! Boundary-aware document chunking
//!
//! Splits source text into overlapping chunks sized for embedding. Chunk ends
//! snap to sentence boundaries (`.`, `!`, `?` or newline followed by
//! whitespace) so a chunk rarely cuts a sentence in half. Pure computation:
//! no shared state, no I/O.

use crate::config::ChunkerConfig;
use serde::{Deserialize, Serialize};

/// A contiguous slice of a source document sized for embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    /// Chunk text, trimmed of surrounding whitespace
    pub text: String,
    /// Byte offset of the chunk start in the source text
    pub start_position: usize,
    /// Byte offset just past the chunk end in the source text
    pub end_position: usize,
    /// Sequence number in emission order
    pub chunk_index: usize,
}

/// Document chunker
pub struct DocumentChunker {
    config: ChunkerConfig,
}

impl DocumentChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// Split a document into ordered, overlapping chunks
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let boundaries = self.find_sentence_boundaries(text);
        self.split_by_boundaries(text, &boundaries)
    }

    /// Rough token count: `len / chars_per_token`.
    ///
    /// A heuristic, not a tokenizer. Good enough for sizing chunks and
    /// budgeting context; never treated as ground truth.
    pub fn estimate_tokens(&self, text: &str) -> usize {
        text.len() / self.config.chars_per_token
    }

    /// Byte positions where a chunk may end. Position 0 and `text.len()` are
    /// always boundaries; a sentence terminator followed by whitespace marks a
    /// boundary just after the terminator.
    fn find_sentence_boundaries(&self, text: &str) -> Vec<usize> {
        let bytes = text.as_bytes();
        let mut boundaries = vec![0];

        for i in 0..bytes.len() {
            let c = bytes[i];
            if c == b'.' || c == b'!' || c == b'?' || c == b'\n' {
                if i + 1 < bytes.len() && bytes[i + 1].is_ascii_whitespace() {
                    boundaries.push(i + 1);
                }
            }
        }

        boundaries.push(text.len());
        boundaries
    }

    fn split_by_boundaries(&self, text: &str, boundaries: &[usize]) -> Vec<TextChunk> {
        let mut chunks: Vec<TextChunk> = Vec::new();

        let chunk_size_chars = self.config.chunk_size * self.config.chars_per_token;
        let overlap_chars = self.config.chunk_overlap * self.config.chars_per_token;

        let mut chunk_index = 0;
        let mut start_pos = 0;

        while start_pos < text.len() {
            let target_end = start_pos + chunk_size_chars;

            // First recorded boundary at or after the target, else end of text
            let end_pos = boundaries
                .iter()
                .copied()
                .find(|&b| b >= target_end)
                .unwrap_or(text.len());

            // Don't emit a tiny tail chunk; fold it into the previous one
            if end_pos - start_pos < chunk_size_chars / 2 && chunk_index > 0 {
                if let Some(last) = chunks.last_mut() {
                    last.text.push(' ');
                    last.text.push_str(text[start_pos..].trim());
                    last.end_position = text.len();
                }
                break;
            }

            let chunk_text = text[start_pos..end_pos].trim();
            if !chunk_text.is_empty() {
                chunks.push(TextChunk {
                    text: chunk_text.to_string(),
                    start_position: start_pos,
                    end_position: end_pos,
                    chunk_index,
                });
                chunk_index += 1;
            }

            if end_pos >= text.len() {
                break;
            }

            let mut next_start = if end_pos > overlap_chars {
                end_pos - overlap_chars
            } else {
                end_pos
            };
            // Overlap is counted in bytes; nudge forward off a multi-byte char
            while !text.is_char_boundary(next_start) {
                next_start += 1;
            }
            start_pos = next_start;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_chunker() -> DocumentChunker {
        DocumentChunker::new(ChunkerConfig::default())
    }

    fn small_chunker(chunk_size: usize, chunk_overlap: usize) -> DocumentChunker {
        DocumentChunker::new(ChunkerConfig {
            chunk_size,
            chunk_overlap,
            chars_per_token: 4,
        })
    }

    #[test]
    fn test_empty_text_produces_no_chunks() {
        assert!(default_chunker().chunk("").is_empty());
    }

    #[test]
    fn test_single_line_text() {
        let chunks = default_chunker().chunk("Hello world.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello world.");
    }

    #[test]
    fn test_multi_sentence_text() {
        let chunks = default_chunker().chunk("First sentence. Second sentence. Third sentence.");
        assert!(!chunks.is_empty());
        assert!(chunks[0].text.contains("First"));
    }

    #[test]
    fn test_chunk_indexing_is_sequential() {
        let mut text = String::new();
        for i in 0..200 {
            text.push_str(&format!("Sentence number {} in the document. ", i));
        }

        let chunks = small_chunker(64, 8).chunk(&text);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
        }
    }

    #[test]
    fn test_position_metadata() {
        let text = "First sentence. Second sentence.";
        let chunks = default_chunker().chunk(text);

        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].start_position, 0);
        assert!(chunks[0].end_position > 0);
        assert!(chunks[0].end_position <= text.len());
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let mut text = String::new();
        for _ in 0..20 {
            text.push_str("This is a test sentence. ");
        }

        let chunks = small_chunker(16, 8).chunk(&text);
        if chunks.len() >= 2 {
            assert!(chunks[1].start_position < chunks[0].end_position);
        }
    }

    #[test]
    fn test_whitespace_trimming() {
        let chunks = default_chunker().chunk("  First sentence.   Second sentence.  ");
        for chunk in &chunks {
            assert_eq!(chunk.text, chunk.text.trim());
            assert!(!chunk.text.is_empty());
        }
    }

    #[test]
    fn test_exclamation_and_question_boundaries() {
        let chunks = default_chunker().chunk("Wow! Amazing text here. Is this a question? Yes.");
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_newline_boundaries() {
        let chunks = default_chunker().chunk("First line.\nSecond line.\nThird line.");
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_long_text_without_boundaries() {
        // No terminator-plus-whitespace anywhere, so ends snap to end-of-text
        let text = "word".repeat(5000);
        let chunks = default_chunker().chunk(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end_position, text.len());
    }

    #[test]
    fn test_only_punctuation() {
        let chunks = default_chunker().chunk("!!!...???");
        assert!(chunks.len() <= 1);
    }

    #[test]
    fn test_tiny_tail_merges_into_previous_chunk() {
        // Six 50-char sentences fill one 256-char chunk (snapped to the next
        // boundary); the 6-char tail is below half the target and merges
        let mut text = String::new();
        for _ in 0..6 {
            text.push_str("A reasonably long test sentence goes right here. ");
        }
        text.push_str("Tail.");

        let chunks = small_chunker(64, 0).chunk(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end_position, text.len());
        assert!(chunks[0].text.ends_with("Tail."));
    }

    #[test]
    fn test_coverage_of_large_document() {
        let mut text = String::new();
        for i in 0..1000 {
            text.push_str(&format!("This is sentence number {}. ", i));
        }
        assert!(text.len() > 10_000);

        let chunks = default_chunker().chunk(&text);
        assert!(!chunks.is_empty());

        // Chunks span the document from the first byte to the last
        assert_eq!(chunks[0].start_position, 0);
        assert_eq!(chunks.last().unwrap().end_position, text.len());
        for pair in chunks.windows(2) {
            assert!(pair[1].start_position <= pair[0].end_position);
        }
    }

    #[test]
    fn test_example_configuration_shape() {
        // chunk_size=512, overlap=50, chars_per_token=4: ~2048-char chunks
        let mut text = String::new();
        for _ in 0..20 {
            text.push_str(&"The same phrase repeats through the document many times over. ".repeat(10));
        }
        assert!(text.len() > 10_000);

        let chunker = small_chunker(512, 50);
        let chunks = chunker.chunk(&text);
        assert!(!chunks.is_empty());
        for (i, chunk) in chunks.iter().enumerate() {
            assert!(!chunk.text.is_empty());
            // Ends snap to the next boundary, so allow one sentence of
            // slack; the final chunk may additionally absorb a merged tail
            let slack = if i + 1 == chunks.len() { 1024 + 128 } else { 128 };
            assert!(chunk.end_position - chunk.start_position <= 2048 + slack);
        }
        for pair in chunks.windows(2) {
            assert!(pair[1].start_position < pair[0].end_position);
        }
    }

    #[test]
    fn test_token_estimation() {
        let chunker = default_chunker();
        assert_eq!(chunker.estimate_tokens(""), 0);
        assert_eq!(chunker.estimate_tokens("abcdefgh"), 2);

        let short = chunker.estimate_tokens("Short.");
        let long = chunker.estimate_tokens(&"a long stretch of text ".repeat(20));
        assert!(short < long);
    }

    #[test]
    fn test_multibyte_text_does_not_split_mid_character() {
        let mut text = String::new();
        for _ in 0..300 {
            text.push_str("Ein Satz über äußerst schöne Gärten und Bäume. ");
        }

        let chunks = small_chunker(16, 8).chunk(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(text.is_char_boundary(chunk.start_position));
            assert!(text.is_char_boundary(chunk.end_position));
        }
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text = "Test sentence. Another test. Final test.";
        let chunker = default_chunker();
        let a = chunker.chunk(text);
        let b = chunker.chunk(text);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.start_position, y.start_position);
        }
    }
}
