use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{ArticleCraftError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every failure
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_vectorizer(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_sampler(config, &mut errors);
        Self::validate_generation(config, &mut errors);
        Self::validate_llm(config, &mut errors);

        if config.recommend.default_top_k == 0 {
            errors.push(ValidationError::new(
                "recommend.default_top_k",
                "Default top_k must be at least 1",
            ));
        }

        if config.server.max_connections == 0 {
            errors.push(ValidationError::new(
                "server.max_connections",
                "Max connections must be greater than 0",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ArticleCraftError::ConfigValidation { errors })
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
        // Existence is not checked: `~` is expanded later and `build` creates the directories
        let paths = [
            ("storage.data_dir", &config.storage.data_dir),
            ("storage.corpus_file", &config.storage.corpus_file),
            ("storage.database_file", &config.storage.database_file),
            ("storage.artifacts_dir", &config.storage.artifacts_dir),
            ("generation.reference_dir", &config.generation.reference_dir),
            ("sampler.output_dir", &config.sampler.output_dir),
            ("server.socket_path", &config.server.socket_path),
        ];

        for (key, path) in paths {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::new(key, "Path cannot be empty"));
            }
        }
    }

    fn validate_vectorizer(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.vectorizer.max_features == 0 {
            errors.push(ValidationError::new(
                "vectorizer.max_features",
                "Max features must be greater than 0",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.index.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if config.index.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if config.index.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }
    }

    fn validate_sampler(config: &Config, errors: &mut Vec<ValidationError>) {
        let sampler = &config.sampler;
        let counts = [
            ("sampler.chunk_size", sampler.chunk_size),
            ("sampler.batch_size", sampler.batch_size),
            ("sampler.n_clusters", sampler.n_clusters),
            ("sampler.n_per_cluster", sampler.n_per_cluster),
            ("sampler.max_iter", sampler.max_iter),
        ];

        for (key, value) in counts {
            if value == 0 {
                errors.push(ValidationError::new(key, "Value must be greater than 0"));
            }
        }
    }

    fn validate_generation(config: &Config, errors: &mut Vec<ValidationError>) {
        let generation = &config.generation;

        if generation.chunk_size == 0 {
            errors.push(ValidationError::new(
                "generation.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }

        if generation.chunk_overlap >= generation.chunk_size {
            errors.push(ValidationError::new(
                "generation.chunk_overlap",
                format!(
                    "Chunk overlap ({}) must be smaller than chunk size ({})",
                    generation.chunk_overlap, generation.chunk_size
                ),
            ));
        }

        if generation.max_context_chars == 0 {
            errors.push(ValidationError::new(
                "generation.max_context_chars",
                "Context bound must be greater than 0",
            ));
        } else if generation.chunk_size > generation.max_context_chars {
            errors.push(ValidationError::new(
                "generation.max_context_chars",
                format!(
                    "Context bound ({}) must hold at least one segment of chunk size ({})",
                    generation.max_context_chars, generation.chunk_size
                ),
            ));
        }

        if generation.num_similar_articles == 0 {
            errors.push(ValidationError::new(
                "generation.num_similar_articles",
                "At least one reference segment is required",
            ));
        }

        if generation.sample_size == 0 {
            errors.push(ValidationError::new(
                "generation.sample_size",
                "Sample size must be greater than 0",
            ));
        }

        if generation.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "generation.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        // The API key is checked when the backend is constructed, not here:
        // recommendation-only deployments never need it.
        let temp = config.llm.temperature;
        if !(0.0..=2.0).contains(&temp) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", temp),
            ));
        }

        let provider = &config.llm.provider;
        let valid_providers = ["groq", "openai", "ollama"];
        if !valid_providers.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "llm.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, provider
                ),
            ));
        }

        let endpoint = config.llm.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            errors.push(ValidationError::new(
                "llm.endpoint",
                format!("Endpoint must start with http:// or https://, got '{}'", endpoint),
            ));
        }

        if config.llm.model.is_empty() {
            errors.push(ValidationError::new("llm.model", "Model name cannot be empty"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_empty_artifacts_path() {
        let mut config = Config::default();
        config.storage.artifacts_dir = PathBuf::new();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_overlap_not_smaller_than_chunk() {
        let mut config = Config::default();
        config.generation.chunk_size = 200;
        config.generation.chunk_overlap = 200;

        match ConfigValidator::validate(&config) {
            Err(ArticleCraftError::ConfigValidation { errors }) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].path, "generation.chunk_overlap");
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_context_bound_smaller_than_chunk() {
        let mut config = Config::default();
        config.generation.chunk_size = 1000;
        config.generation.max_context_chars = 400;

        match ConfigValidator::validate(&config) {
            Err(ArticleCraftError::ConfigValidation { errors }) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].path, "generation.max_context_chars");
            }
            other => panic!("Expected validation error, got {:?}", other),
        }

        config.generation.max_context_chars = 1000;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.sampler.n_clusters = 0;
        config.sampler.n_per_cluster = 0;
        config.llm.provider = "unknown".to_string();

        match ConfigValidator::validate(&config) {
            Err(ArticleCraftError::ConfigValidation { errors }) => assert_eq!(errors.len(), 3),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }
}
