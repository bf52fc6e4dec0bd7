use crate::config::RetrievalConfig;
use crate::error::{RaglineError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &RetrievalConfig) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_embedding(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_prompt_template(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RaglineError::ConfigValidation { errors })
        }
    }

    fn validate_embedding(config: &RetrievalConfig, errors: &mut Vec<ValidationError>) {
        if config.embedding_dimension == 0 {
            errors.push(ValidationError::new(
                "embedding_dimension",
                "Embedding dimension must be greater than 0",
            ));
        }
    }

    fn validate_chunking(config: &RetrievalConfig, errors: &mut Vec<ValidationError>) {
        if config.chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunk_size",
                "Chunk size must be greater than 0",
            ));
        }

        if config.chunk_overlap >= config.chunk_size {
            errors.push(ValidationError::new(
                "chunk_overlap",
                format!(
                    "Chunk overlap ({}) must be smaller than chunk size ({})",
                    config.chunk_overlap, config.chunk_size
                ),
            ));
        }
    }

    fn validate_retrieval(config: &RetrievalConfig, errors: &mut Vec<ValidationError>) {
        if config.top_k == 0 {
            errors.push(ValidationError::new("top_k", "top_k must be greater than 0"));
        }

        if !(0.0..=1.0).contains(&config.similarity_threshold) {
            errors.push(ValidationError::new(
                "similarity_threshold",
                format!(
                    "Similarity threshold must be in [0.0, 1.0], got {}",
                    config.similarity_threshold
                ),
            ));
        }

        if config.max_context_tokens == 0 {
            errors.push(ValidationError::new(
                "max_context_tokens",
                "Context budget must be greater than 0",
            ));
        }
    }

    fn validate_prompt_template(config: &RetrievalConfig, errors: &mut Vec<ValidationError>) {
        for placeholder in ["{context}", "{query}"] {
            if !config.prompt_template.contains(placeholder) {
                errors.push(ValidationError::new(
                    "prompt_template",
                    format!("Prompt template is missing the {} placeholder", placeholder),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&RetrievalConfig::default()).is_ok());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let config = RetrievalConfig {
            chunk_size: 50,
            chunk_overlap: 50,
            ..RetrievalConfig::default()
        };
        let result = ConfigValidator::validate(&config);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_placeholder_rejected() {
        let config = RetrievalConfig {
            prompt_template: "Answer using {context} only.".to_string(),
            ..RetrievalConfig::default()
        };
        match ConfigValidator::validate(&config) {
            Err(RaglineError::ConfigValidation { errors }) => {
                assert!(errors.iter().any(|e| e.path == "prompt_template"));
            }
            other => panic!("expected validation failure, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let config = RetrievalConfig {
            similarity_threshold: 1.5,
            ..RetrievalConfig::default()
        };
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
