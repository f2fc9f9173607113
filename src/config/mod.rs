//! Configuration management for ArticleCraft
//!
//! Loads `config.toml`, applies profile and environment overrides and runs
//! the validator before handing the configuration to the services.

use crate::embedding::VectorizerKind;
use crate::error::{ArticleCraftError, Result};
use crate::generation::FallbackStrategy;
use crate::index::{IndexBackend, Metric};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub vectorizer: VectorizerConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub recommend: RecommendConfig,
    pub sampler: SamplerConfig,
    pub generation: GenerationConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Where the corpus and the persisted artifacts live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// JSONL corpus (`title`, `text`, `clean_text`, optional `url`)
    pub corpus_file: PathBuf,
    /// SQLite article store
    pub database_file: PathBuf,
    /// Recommendation index artifacts
    pub artifacts_dir: PathBuf,
}

/// Recommendation vectorizer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorizerConfig {
    pub kind: VectorizerKind,
    pub max_features: usize,
    pub stop_words: bool,
}

/// Dense embedding model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
}

/// Similarity index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub metric: Metric,
    pub backend: IndexBackend,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
}

/// Recommender defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendConfig {
    pub default_top_k: usize,
}

/// Representative sampler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Rows per chunk; bounds the working set of one pass
    pub chunk_size: usize,
    /// Embedding and mini-batch k-means batch size
    pub batch_size: usize,
    pub n_clusters: usize,
    pub n_per_cluster: usize,
    pub seed: u64,
    /// Mini-batch steps per chunk
    pub max_iter: usize,
    pub output_dir: PathBuf,
}

/// Retrieval-augmented generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub vectorizer: VectorizerKind,
    /// Articles sampled from the corpus into the reference index
    pub sample_size: usize,
    pub sample_seed: u64,
    /// Segment size in characters
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_context_chars: usize,
    pub num_similar_articles: usize,
    pub exclude_same_title: bool,
    pub fallback: FallbackStrategy,
    pub timeout_secs: u64,
    pub reference_dir: PathBuf,
}

/// Completion backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub endpoint: String,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Query server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
    pub max_connections: usize,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vectorizer_kind: Option<VectorizerKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_backend: Option<IndexBackend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_fallback: Option<FallbackStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_model: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ArticleCraftError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ArticleCraftError::io(e, format!("Failed to read config file: {:?}", path))
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| {
            ArticleCraftError::io(e, format!("Failed to write config file: {:?}", path))
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self.profiles.get(profile).cloned().ok_or_else(|| {
            ArticleCraftError::Config(format!("Unknown profile: {}", profile))
        })?;

        if let Some(kind) = overrides.vectorizer_kind {
            self.vectorizer.kind = kind;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(backend) = overrides.index_backend {
            self.index.backend = backend;
        }
        if let Some(fallback) = overrides.generation_fallback {
            self.generation.fallback = fallback;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: ARTICLECRAFT_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("ARTICLECRAFT_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        let invalid = |message: String| ArticleCraftError::InvalidConfigValue {
            path: path.to_string(),
            message,
        };

        match path {
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "STORAGE__CORPUS_FILE" => self.storage.corpus_file = PathBuf::from(value),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "LLM__MODEL" => self.llm.model = value.to_string(),
            "LLM__ENDPOINT" => self.llm.endpoint = value.to_string(),
            "VECTORIZER__KIND" => {
                self.vectorizer.kind = value.parse().map_err(invalid)?;
            }
            "INDEX__METRIC" => {
                self.index.metric = value.parse().map_err(invalid)?;
            }
            "GENERATION__FALLBACK" => {
                self.generation.fallback = value.parse().map_err(invalid)?;
            }
            "GENERATION__TIMEOUT_SECS" => {
                self.generation.timeout_secs = value
                    .parse()
                    .map_err(|_| invalid(format!("Cannot parse '{}' as seconds", value)))?;
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            ArticleCraftError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("articlecraft").join("config.toml"))
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.articlecraft");

        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: data_dir.clone(),
                corpus_file: data_dir.join("final_nlp_data.jsonl"),
                database_file: data_dir.join("articles.sqlite"),
                artifacts_dir: data_dir.join("models"),
            },
            vectorizer: VectorizerConfig {
                kind: VectorizerKind::Tfidf,
                max_features: 5000,
                stop_words: true,
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
            },
            index: IndexConfig {
                metric: Metric::Cosine,
                backend: IndexBackend::Exact,
                hnsw_m: 16,
                hnsw_ef_construction: 200,
                hnsw_ef_search: 64,
            },
            recommend: RecommendConfig { default_top_k: 5 },
            sampler: SamplerConfig {
                chunk_size: 10_000,
                batch_size: 32,
                n_clusters: 20,
                n_per_cluster: 5,
                seed: 42,
                max_iter: 100,
                output_dir: data_dir.join("representative_samples"),
            },
            generation: GenerationConfig {
                vectorizer: VectorizerKind::Dense,
                sample_size: 1000,
                sample_seed: 42,
                chunk_size: 1000,
                chunk_overlap: 200,
                max_context_chars: 6000,
                num_similar_articles: 3,
                exclude_same_title: true,
                fallback: FallbackStrategy::None,
                timeout_secs: 60,
                reference_dir: data_dir.join("vector_db"),
            },
            llm: LlmConfig {
                provider: "groq".to_string(),
                endpoint: "https://api.groq.com/openai".to_string(),
                api_key_env: "GROQ_API_KEY".to_string(),
                model: "llama3-8b-8192".to_string(),
                temperature: 0.7,
                max_tokens: None,
            },
            server: ServerConfig {
                socket_path: data_dir.join("articlecraft.sock"),
                max_connections: 32,
            },
            profiles: HashMap::new(),
        }
    }
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ArticleCraftError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            ArticleCraftError::Config("Cannot determine home directory".to_string())
        })?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
