use crate::config::{Config, SCHEMA_VERSION};
use crate::embedding::{resolve_model, PROVIDER_FASTEMBED, PROVIDER_MOCK};
use crate::error::{LoreError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem found
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LoreError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        // Paths may contain ~ and may not exist yet, so only emptiness is checked
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let embedding = &config.embedding;

        let provider = embedding.provider.as_str();
        if provider != PROVIDER_MOCK && provider != PROVIDER_FASTEMBED {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be '{}' or '{}', got '{}'",
                    PROVIDER_MOCK, PROVIDER_FASTEMBED, provider
                ),
            ));
        }

        if embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }

        // A known model fixes the dimension
        if provider == PROVIDER_FASTEMBED {
            if let Some((_, dimension)) = resolve_model(&embedding.model) {
                if dimension != embedding.dimension {
                    errors.push(ValidationError::new(
                        "embedding.dimension",
                        format!(
                            "Model {} produces {}-dimensional vectors, configured {}",
                            embedding.model, dimension, embedding.dimension
                        ),
                    ));
                }
            } else if !embedding.model.is_empty() {
                errors.push(ValidationError::new(
                    "embedding.model",
                    format!("Unsupported model: {}", embedding.model),
                ));
            }
        }

        if embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        let chunking = &config.chunking;

        if chunking.min_tokens == 0 {
            errors.push(ValidationError::new(
                "chunking.min_tokens",
                "Minimum chunk size must be greater than 0",
            ));
        }

        if chunking.min_tokens > chunking.max_tokens {
            errors.push(ValidationError::new(
                "chunking.min_tokens",
                format!(
                    "Minimum chunk size {} exceeds maximum {}",
                    chunking.min_tokens, chunking.max_tokens
                ),
            ));
        }

        if chunking.overlap_tokens >= chunking.max_tokens {
            errors.push(ValidationError::new(
                "chunking.overlap_tokens",
                format!(
                    "Overlap {} must be smaller than maximum chunk size {}",
                    chunking.overlap_tokens, chunking.max_tokens
                ),
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "top_k must be greater than 0",
            ));
        }
    }
}
