/// Text vectorization
///
/// Two interchangeable strategies behind [`TextVectorizer`]:
/// - [`TfidfVectorizer`]: sparse keyword weights over a capped vocabulary
/// - [`DenseVectorizer`]: sentence embeddings from an [`EmbeddingProvider`]
///   (FastEmbed all-MiniLM-L6-v2 by default, or the offline hashing provider)
mod dense;
mod provider;
mod tfidf;

pub use dense::DenseVectorizer;
pub use provider::{
    provider_for_model, EmbeddingError, EmbeddingProvider, FastEmbedProvider, HashingProvider,
};
pub use tfidf::{TfidfState, TfidfVectorizer};

use crate::error::{ArticleCraftError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Whether a text has at least one token an embedder can hash or encode
pub fn has_content(text: &str) -> bool {
    text.chars().any(char::is_alphanumeric)
}

/// Vectorization strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorizerKind {
    Tfidf,
    Dense,
}

impl FromStr for VectorizerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tfidf" | "tf-idf" => Ok(Self::Tfidf),
            "dense" | "embedding" => Ok(Self::Dense),
            other => Err(format!(
                "Unknown vectorizer '{}', expected 'tfidf' or 'dense'",
                other
            )),
        }
    }
}

impl fmt::Display for VectorizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tfidf => write!(f, "tfidf"),
            Self::Dense => write!(f, "dense"),
        }
    }
}

/// Persistable fitted state of a vectorizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VectorizerState {
    Tfidf(TfidfState),
    Dense { model: String, dimension: usize },
}

/// Maps text to fixed-dimension vectors
///
/// `fit` populates internal state only; `transform` is pure afterwards.
pub trait TextVectorizer: Send + Sync {
    fn kind(&self) -> VectorizerKind;

    /// Learn vocabulary/weights from the corpus (no-op for dense models)
    fn fit(&mut self, corpus: &[String]) -> Result<()>;

    /// Vectorize one text; `NotFitted` before `fit`
    fn transform(&self, text: &str) -> Result<Vec<f32>>;

    /// Vectorize many texts, one row per input in order
    fn transform_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.transform(t)).collect()
    }

    fn dimension(&self) -> Result<usize>;

    fn state(&self) -> Result<VectorizerState>;
}

/// Settings needed to construct a vectorizer
#[derive(Debug, Clone)]
pub struct VectorizerSettings {
    pub kind: VectorizerKind,
    pub max_features: Option<usize>,
    pub stop_words: bool,
    pub batch_size: usize,
}

/// Create an unfitted vectorizer
///
/// Dense vectorizers need a provider; TF-IDF ignores it.
pub fn new_vectorizer(
    settings: &VectorizerSettings,
    provider: Option<Arc<dyn EmbeddingProvider>>,
) -> Result<Box<dyn TextVectorizer>> {
    match settings.kind {
        VectorizerKind::Tfidf => Ok(Box::new(TfidfVectorizer::new(
            settings.max_features,
            settings.stop_words,
        )?)),
        VectorizerKind::Dense => {
            let provider = provider.ok_or_else(|| {
                ArticleCraftError::Config("Dense vectorizer requires an embedding provider".into())
            })?;
            Ok(Box::new(DenseVectorizer::new(provider, settings.batch_size)))
        }
    }
}

/// Rebuild a fitted vectorizer from persisted state
pub fn restore_vectorizer(
    state: VectorizerState,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    batch_size: usize,
) -> Result<Box<dyn TextVectorizer>> {
    match state {
        VectorizerState::Tfidf(state) => Ok(Box::new(TfidfVectorizer::from_state(state)?)),
        VectorizerState::Dense { model, dimension } => {
            let provider = provider.ok_or_else(|| {
                ArticleCraftError::IndexUnavailable(format!(
                    "Index requires embedding model '{}' but no provider is available",
                    model
                ))
            })?;
            Ok(Box::new(DenseVectorizer::restore(
                provider, batch_size, &model, dimension,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_content() {
        assert!(has_content("a"));
        assert!(has_content("  42 "));
        assert!(!has_content(""));
        assert!(!has_content("\u{2014} \u{2026} ?!"));
    }

    #[test]
    fn test_vectorizer_kind_parse() {
        assert_eq!("TFIDF".parse::<VectorizerKind>(), Ok(VectorizerKind::Tfidf));
        assert_eq!("dense".parse::<VectorizerKind>(), Ok(VectorizerKind::Dense));
        assert!("bm25".parse::<VectorizerKind>().is_err());
        assert_eq!(VectorizerKind::Dense.to_string(), "dense");
    }

    #[test]
    fn test_dense_requires_provider() {
        let settings = VectorizerSettings {
            kind: VectorizerKind::Dense,
            max_features: None,
            stop_words: true,
            batch_size: 8,
        };
        assert!(new_vectorizer(&settings, None).is_err());

        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(8).unwrap());
        let vectorizer = new_vectorizer(&settings, Some(provider)).unwrap();
        assert_eq!(vectorizer.kind(), VectorizerKind::Dense);
    }

    #[test]
    fn test_state_serializes_with_kind_tag() {
        let state = VectorizerState::Dense {
            model: "hashing-8".to_string(),
            dimension: 8,
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"kind\":\"dense\""));
        let back: VectorizerState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
