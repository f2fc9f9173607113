//! Caller-facing services
//!
//! [`ArticleServices`] owns the current recommendation snapshot and reference
//! index. Nothing is loaded implicitly: the hosting process calls
//! [`ArticleServices::initialize`] once, and rebuilds construct a complete new
//! snapshot before swapping it in, so readers never observe a partial build.

use crate::config::{expand_path, Config};
use crate::corpus::{read_corpus, ArticleStore, Corpus, CorpusEntry};
use crate::embedding::{
    new_vectorizer, provider_for_model, EmbeddingProvider, VectorizerKind, VectorizerSettings,
};
use crate::error::{ArticleCraftError, Result};
use crate::generation::{
    ArticleGenerator, CompletionBackend, GenerationSettings, OpenAiCompatibleBackend,
    ReferenceIndex,
};
use crate::index::artifacts::ArtifactStore;
use crate::index::HnswParams;
use crate::recommend::{Recommendation, Recommender};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// A generated article as handed to the web layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedArticle {
    pub title: String,
    pub content: String,
    pub reference_titles: Vec<String>,
    pub elapsed_seconds: f64,
    pub fallback_used: bool,
}

/// Which capabilities are currently usable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Availability {
    pub recommender: bool,
    pub articles: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommender_error: Option<String>,
    pub generator: bool,
    pub reference_segments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_error: Option<String>,
}

pub struct ArticleServices {
    config: Config,
    provider: Mutex<Option<Arc<dyn EmbeddingProvider>>>,
    backend: Mutex<Option<Arc<dyn CompletionBackend>>>,
    recommender: RwLock<Option<Arc<Recommender>>>,
    reference: RwLock<Option<Arc<ReferenceIndex>>>,
    last_errors: Mutex<(Option<String>, Option<String>)>,
}

impl ArticleServices {
    pub fn new(config: Config) -> Self {
        Self::with_components(config, None, None)
    }

    /// Services with a preset embedding provider and completion backend
    pub fn with_components(
        config: Config,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        backend: Option<Arc<dyn CompletionBackend>>,
    ) -> Self {
        Self {
            config,
            provider: Mutex::new(provider),
            backend: Mutex::new(backend),
            recommender: RwLock::new(None),
            reference: RwLock::new(None),
            last_errors: Mutex::new((None, None)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load persisted artifacts; missing or broken ones leave the capability
    /// unavailable rather than failing
    pub fn initialize(&self) -> Availability {
        let recommender_error = match self.load_recommender() {
            Ok(rec) => {
                tracing::info!("Recommendation index loaded: {} articles", rec.len());
                self.swap_recommender(rec);
                None
            }
            Err(e) => {
                tracing::warn!("Recommendations unavailable: {}", e);
                Some(e.to_string())
            }
        };

        let generator_error = match self.load_reference() {
            Ok(reference) => {
                tracing::info!("Reference index loaded: {} segments", reference.len());
                self.swap_reference(reference);
                None
            }
            Err(e) => {
                tracing::warn!("Article generation unavailable: {}", e);
                Some(e.to_string())
            }
        };

        *self.last_errors.lock().unwrap_or_else(PoisonError::into_inner) =
            (recommender_error, generator_error);
        self.availability()
    }

    pub fn availability(&self) -> Availability {
        let recommender = self.recommender_snapshot();
        let reference = self.reference_snapshot();
        let (recommender_error, generator_error) = self
            .last_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        Availability {
            recommender: recommender.is_some(),
            articles: recommender.as_ref().map(|r| r.len()).unwrap_or(0),
            recommender_error: recommender.is_none().then_some(recommender_error).flatten(),
            generator: reference.as_ref().map(|r| !r.is_empty()).unwrap_or(false),
            reference_segments: reference.as_ref().map(|r| r.len()).unwrap_or(0),
            generator_error: reference.is_none().then_some(generator_error).flatten(),
        }
    }

    /// Corpus rows from the SQLite store when it has any, else the JSONL file
    pub fn load_corpus(&self) -> Result<Vec<CorpusEntry>> {
        let db_path = expand_path(&self.config.storage.database_file)?;
        if db_path.exists() {
            let store = ArticleStore::open(&db_path)?;
            if store.count()? > 0 {
                tracing::info!("Loading corpus from {}", db_path.display());
                return store.load_all();
            }
        }

        let corpus_path = expand_path(&self.config.storage.corpus_file)?;
        tracing::info!("Loading corpus from {}", corpus_path.display());
        read_corpus(&corpus_path)
    }

    /// Build, persist and swap in both indexes
    pub fn rebuild(&self, entries: Vec<CorpusEntry>) -> Result<Availability> {
        // Both snapshots are complete before either is persisted or served
        let reference = self.assemble_reference(&entries)?;
        let recommender = self.assemble_index(entries)?;

        self.persist_reference(&reference)?;
        self.persist_index(&recommender)?;

        self.swap_reference(Arc::new(reference));
        self.swap_recommender(Arc::new(recommender));
        Ok(self.availability())
    }

    /// Build and persist a recommendation snapshot, then swap it in
    pub fn build_index(&self, entries: Vec<CorpusEntry>) -> Result<Arc<Recommender>> {
        let recommender = self.assemble_index(entries)?;
        self.persist_index(&recommender)?;

        let recommender = Arc::new(recommender);
        self.swap_recommender(recommender.clone());
        Ok(recommender)
    }

    /// Build and persist the generation reference index, then swap it in
    pub fn build_reference(&self, entries: &[CorpusEntry]) -> Result<Arc<ReferenceIndex>> {
        let reference = self.assemble_reference(entries)?;
        self.persist_reference(&reference)?;

        let reference = Arc::new(reference);
        self.swap_reference(reference.clone());
        Ok(reference)
    }

    fn assemble_index(&self, entries: Vec<CorpusEntry>) -> Result<Recommender> {
        let cfg = &self.config;
        let settings = VectorizerSettings {
            kind: cfg.vectorizer.kind,
            max_features: Some(cfg.vectorizer.max_features),
            stop_words: cfg.vectorizer.stop_words,
            batch_size: cfg.embedding.batch_size,
        };
        let vectorizer = new_vectorizer(&settings, self.provider_for(cfg.vectorizer.kind)?)?;
        Recommender::build(
            Corpus::new(entries),
            vectorizer,
            cfg.index.metric,
            cfg.index.backend,
            self.hnsw_params(),
        )
    }

    fn assemble_reference(&self, entries: &[CorpusEntry]) -> Result<ReferenceIndex> {
        let cfg = &self.config;
        let settings = VectorizerSettings {
            kind: cfg.generation.vectorizer,
            max_features: Some(cfg.vectorizer.max_features),
            stop_words: cfg.vectorizer.stop_words,
            batch_size: cfg.embedding.batch_size,
        };
        let vectorizer = new_vectorizer(&settings, self.provider_for(cfg.generation.vectorizer)?)?;
        ReferenceIndex::build(entries, &GenerationSettings::from(&cfg.generation), vectorizer)
    }

    fn persist_index(&self, recommender: &Recommender) -> Result<()> {
        ArtifactStore::new(self.artifacts_dir()?).save(&recommender.to_artifacts()?)?;
        Ok(())
    }

    fn persist_reference(&self, reference: &ReferenceIndex) -> Result<()> {
        ArtifactStore::new(self.reference_dir()?).save(&reference.to_artifacts()?)?;
        Ok(())
    }

    /// Articles similar to free text
    pub fn recommend(&self, query: &str, top_k: Option<usize>) -> Result<Vec<Recommendation>> {
        let top_k = top_k.unwrap_or(self.config.recommend.default_top_k);
        let recommender = self.require_recommender()?;
        Ok(recommender.recommend_by_query(query, top_k)?.recommendations())
    }

    /// Articles similar to an existing article, excluding it
    pub fn recommend_by_existing_title(
        &self,
        title: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<Recommendation>> {
        let top_k = top_k.unwrap_or(self.config.recommend.default_top_k);
        let recommender = self.require_recommender()?;
        Ok(recommender.recommend_by_title(title, top_k)?.recommendations())
    }

    pub async fn generate_article(
        &self,
        title: &str,
        num_similar: Option<usize>,
    ) -> Result<GeneratedArticle> {
        let settings = GenerationSettings::from(&self.config.generation);
        let num_similar = num_similar.unwrap_or(settings.num_similar_articles);

        let reference = self.reference_snapshot().ok_or_else(|| {
            ArticleCraftError::GenerationUnavailable(
                "Reference index is not loaded; run `articlecraft build`".to_string(),
            )
        })?;

        let generator = ArticleGenerator::new(settings, self.backend()?).with_index(Some(reference));
        let response = generator.generate(title, num_similar).await?;

        Ok(GeneratedArticle {
            reference_titles: response.reference_titles(),
            title: response.title,
            content: response.completion_text,
            elapsed_seconds: response.elapsed_seconds,
            fallback_used: response.fallback_used,
        })
    }

    pub fn recommender_snapshot(&self) -> Option<Arc<Recommender>> {
        self.recommender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reference_snapshot(&self) -> Option<Arc<ReferenceIndex>> {
        self.reference
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_recommender(&self) -> Result<Arc<Recommender>> {
        self.recommender_snapshot().ok_or_else(|| {
            ArticleCraftError::IndexUnavailable(
                "Recommendation index is not loaded; run `articlecraft build`".to_string(),
            )
        })
    }

    fn swap_recommender(&self, recommender: Arc<Recommender>) {
        *self
            .recommender
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(recommender);
    }

    fn swap_reference(&self, reference: Arc<ReferenceIndex>) {
        *self.reference.write().unwrap_or_else(PoisonError::into_inner) = Some(reference);
    }

    fn load_recommender(&self) -> Result<Arc<Recommender>> {
        let store = ArtifactStore::new(self.artifacts_dir()?);
        let manifest = store.manifest()?;
        let provider = self.provider_for(manifest.vectorizer)?;
        let rec = Recommender::from_artifacts(store.load()?, provider, self.config.embedding.batch_size)?;
        Ok(Arc::new(rec))
    }

    fn load_reference(&self) -> Result<Arc<ReferenceIndex>> {
        let store = ArtifactStore::new(self.reference_dir()?);
        let manifest = store.manifest()?;
        let provider = self.provider_for(manifest.vectorizer)?;
        let reference =
            ReferenceIndex::from_artifacts(store.load()?, provider, self.config.embedding.batch_size)?;
        Ok(Arc::new(reference))
    }

    /// The shared embedding provider, created on first use by a dense vectorizer
    fn provider_for(&self, kind: VectorizerKind) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
        if kind != VectorizerKind::Dense {
            return Ok(None);
        }

        let mut slot = self.provider.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(provider) = slot.as_ref() {
            return Ok(Some(provider.clone()));
        }

        let provider = provider_for_model(&self.config.embedding.model)?;
        *slot = Some(provider.clone());
        Ok(Some(provider))
    }

    fn backend(&self) -> Result<Arc<dyn CompletionBackend>> {
        let mut slot = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(backend) = slot.as_ref() {
            return Ok(backend.clone());
        }

        let timeout = std::time::Duration::from_secs(self.config.generation.timeout_secs);
        let backend: Arc<dyn CompletionBackend> =
            Arc::new(OpenAiCompatibleBackend::from_config(&self.config.llm, timeout)?);
        *slot = Some(backend.clone());
        Ok(backend)
    }

    fn artifacts_dir(&self) -> Result<PathBuf> {
        expand_path(&self.config.storage.artifacts_dir)
    }

    fn reference_dir(&self) -> Result<PathBuf> {
        expand_path(&self.config.generation.reference_dir)
    }

    fn hnsw_params(&self) -> HnswParams {
        HnswParams {
            m: self.config.index.hnsw_m,
            ef_construction: self.config.index.hnsw_ef_construction,
            ef_search: self.config.index.hnsw_ef_search,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(temp: &TempDir) -> Config {
        let mut config = Config::default();
        let root = temp.path();
        config.storage.data_dir = root.to_path_buf();
        config.storage.corpus_file = root.join("corpus.jsonl");
        config.storage.database_file = root.join("articles.sqlite");
        config.storage.artifacts_dir = root.join("models");
        config.generation.reference_dir = root.join("vector_db");
        config.generation.vectorizer = VectorizerKind::Tfidf;
        config
    }

    fn entries() -> Vec<CorpusEntry> {
        vec![
            CorpusEntry::new("0", "A", "Cats are lovely pets.", "cats are lovely pets"),
            CorpusEntry::new("1", "B", "Dogs are loyal pets.", "dogs are loyal pets"),
            CorpusEntry::new("2", "C", "Stock markets fell today.", "stock markets fell today"),
        ]
    }

    #[test]
    fn test_initialize_without_artifacts() {
        let temp = TempDir::new().unwrap();
        let services = ArticleServices::new(config(&temp));

        let availability = services.initialize();
        assert!(!availability.recommender);
        assert!(!availability.generator);
        assert!(availability.recommender_error.is_some());
        assert!(matches!(
            services.recommend("cats", Some(1)),
            Err(ArticleCraftError::IndexUnavailable(_))
        ));
    }

    #[test]
    fn test_build_then_reload() {
        let temp = TempDir::new().unwrap();
        let services = ArticleServices::new(config(&temp));
        services.rebuild(entries()).unwrap();

        let hits = services.recommend_by_existing_title("A", Some(1)).unwrap();
        assert_eq!(hits[0].title, "B");

        let fresh = ArticleServices::new(config(&temp));
        let availability = fresh.initialize();
        assert!(availability.recommender);
        assert_eq!(availability.articles, 3);
        assert_eq!(availability.reference_segments, 3);
        assert_eq!(
            fresh.recommend_by_existing_title("A", Some(1)).unwrap(),
            hits
        );
    }

    #[test]
    fn test_failed_rebuild_leaves_nothing_half_built() {
        let temp = TempDir::new().unwrap();
        let mut cfg = config(&temp);
        cfg.vectorizer.kind = VectorizerKind::Dense;
        cfg.embedding.model = "hashing-abc".to_string();
        let reference_dir = cfg.generation.reference_dir.clone();
        let services = ArticleServices::new(cfg);

        assert!(services.rebuild(entries()).is_err());

        let availability = services.availability();
        assert!(!availability.recommender);
        assert!(!availability.generator);
        assert!(ArtifactStore::new(reference_dir).manifest().is_err());
    }

    #[test]
    fn test_default_top_k() {
        let temp = TempDir::new().unwrap();
        let mut cfg = config(&temp);
        cfg.recommend.default_top_k = 2;
        let services = ArticleServices::new(cfg);
        services.build_index(entries()).unwrap();
        assert_eq!(services.recommend("pets", None).unwrap().len(), 2);
    }
}
