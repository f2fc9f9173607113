use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::generation::BackendError;

/// Main error type for ArticleCraft
#[derive(Error, Debug)]
pub enum ArticleCraftError {
    /// Queried title is absent from the corpus snapshot
    #[error("Not found: {what} '{key}'")]
    NotFound { what: &'static str, key: String },

    /// Vectorizer used before `fit`
    #[error("Vectorizer not fitted: {0}")]
    NotFitted(String),

    /// Index artifacts missing, corrupt or not built
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// Reference index for generation not built or empty
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// Completion backend failed or timed out
    #[error("Generation backend error: {0}")]
    Backend(#[from] BackendError),

    /// Query vector dimensionality disagrees with the index
    #[error("Dimension mismatch in {operation}: expected {expected}, got {actual}")]
    DimensionMismatch {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Caller supplied an argument outside its valid range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Query server errors
    #[error("Server error: {0}")]
    Server(String),
}

impl ArticleCraftError {
    /// Shorthand for an IO error with context
    pub fn io(source: std::io::Error, context: impl Into<String>) -> Self {
        Self::Io {
            source,
            context: context.into(),
        }
    }

    /// Shorthand for a JSON error with context
    pub fn json(source: serde_json::Error, context: impl Into<String>) -> Self {
        Self::Json {
            source,
            context: context.into(),
        }
    }

    /// Stable short code for callers across the query socket
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::NotFitted(_) => "not_fitted",
            Self::IndexUnavailable(_) => "index_unavailable",
            Self::GenerationUnavailable(_) => "generation_unavailable",
            Self::Backend(_) => "backend",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Embedding(_) => "embedding",
            Self::Config(_)
            | Self::ConfigValidation { .. }
            | Self::ConfigNotFound { .. }
            | Self::InvalidConfigValue { .. } => "config",
            _ => "internal",
        }
    }

    /// Whether the caller may recover (empty result, rebuild, retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::IndexUnavailable(_)
                | Self::GenerationUnavailable(_)
                | Self::Backend(_)
        )
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for ArticleCraft operations
pub type Result<T> = std::result::Result<T, ArticleCraftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        let not_found = ArticleCraftError::NotFound {
            what: "title",
            key: "Missing".to_string(),
        };
        assert!(not_found.is_recoverable());
        assert_eq!(not_found.to_string(), "Not found: title 'Missing'");

        let fatal = ArticleCraftError::DimensionMismatch {
            operation: "query",
            expected: 3,
            actual: 2,
        };
        assert!(!fatal.is_recoverable());
        assert!(!ArticleCraftError::NotFitted("tfidf".into()).is_recoverable());
        assert_eq!(not_found.kind(), "not_found");
        assert_eq!(fatal.kind(), "dimension_mismatch");
    }
}
