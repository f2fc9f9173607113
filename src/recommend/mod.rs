//! Article recommendation over a built similarity index
//!
//! A [`Recommender`] is an immutable snapshot: fitted vectorizer, index and
//! the corpus rows the index was built from. Queries never mutate it.

use crate::corpus::{Corpus, CorpusEntry};
use crate::embedding::{restore_vectorizer, EmbeddingProvider, TextVectorizer};
use crate::error::{ArticleCraftError, Result};
use crate::index::artifacts::IndexArtifacts;
use crate::index::{HnswParams, IndexBackend, Metric, SimilarityIndex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// A corpus row with its similarity to the query
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub row: usize,
    pub entry: CorpusEntry,
    pub similarity: f32,
}

/// Hits sorted by descending similarity
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredEntry>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn titles(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.entry.title.as_str()).collect()
    }

    /// Caller-facing shape
    pub fn recommendations(&self) -> Vec<Recommendation> {
        self.hits.iter().map(Recommendation::from).collect()
    }
}

/// What the web layer receives per hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub similarity: f32,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl From<&ScoredEntry> for Recommendation {
    fn from(hit: &ScoredEntry) -> Self {
        Self {
            title: hit.entry.title.clone(),
            similarity: hit.similarity,
            text: hit.entry.clean_text.clone(),
            url: hit.entry.url.clone(),
        }
    }
}

pub struct Recommender {
    vectorizer: Arc<dyn TextVectorizer>,
    index: Arc<SimilarityIndex>,
    corpus: Arc<Corpus>,
}

impl Recommender {
    /// Fit the vectorizer on the corpus' clean text and index every row
    pub fn build(
        corpus: Corpus,
        mut vectorizer: Box<dyn TextVectorizer>,
        metric: Metric,
        backend: IndexBackend,
        hnsw: HnswParams,
    ) -> Result<Self> {
        if corpus.is_empty() {
            return Err(ArticleCraftError::IndexUnavailable(
                "Cannot build a recommendation index from an empty corpus".to_string(),
            ));
        }

        let started = Instant::now();
        let texts = corpus.clean_texts();
        vectorizer.fit(&texts)?;
        let vectors = vectorizer.transform_batch(&texts)?;
        let index = SimilarityIndex::build_with(vectors, metric, backend, hnsw)?;

        tracing::info!(
            "Recommendation index built: {} articles, {} vectorizer, {:.2}s",
            corpus.len(),
            vectorizer.kind(),
            started.elapsed().as_secs_f64()
        );

        Ok(Self {
            vectorizer: Arc::from(vectorizer),
            index: Arc::new(index),
            corpus: Arc::new(corpus),
        })
    }

    /// Restore from persisted artifacts
    pub fn from_artifacts(
        artifacts: IndexArtifacts,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        batch_size: usize,
    ) -> Result<Self> {
        let vectorizer = restore_vectorizer(artifacts.vectorizer, provider, batch_size)?;
        let index = SimilarityIndex::from_parts(artifacts.vectors, &artifacts.spec)?;
        let corpus = Corpus::new(artifacts.corpus);

        let dimension = vectorizer.dimension()?;
        if !index.is_empty() && dimension != index.dimension() {
            return Err(ArticleCraftError::IndexUnavailable(format!(
                "Vectorizer produces {} dimensions but index holds {}",
                dimension,
                index.dimension()
            )));
        }

        Ok(Self {
            vectorizer: Arc::from(vectorizer),
            index: Arc::new(index),
            corpus: Arc::new(corpus),
        })
    }

    /// Snapshot contents for persistence
    pub fn to_artifacts(&self) -> Result<IndexArtifacts> {
        Ok(IndexArtifacts {
            vectorizer: self.vectorizer.state()?,
            vectors: self.index.vectors().to_vec(),
            spec: self.index.spec(),
            corpus: self.corpus.entries().to_vec(),
        })
    }

    /// Articles most similar to free text; nothing is excluded
    pub fn recommend_by_query(&self, text: &str, top_k: usize) -> Result<RetrievalResult> {
        check_top_k(top_k)?;
        let query = self.vectorizer.transform(text)?;
        let neighbors = self.index.query(&query, top_k)?;

        tracing::debug!("Query '{}' matched {} articles", text, neighbors.len());
        Ok(self.scored(neighbors.into_iter().map(|n| (n.row, n.distance))))
    }

    /// Articles most similar to an existing one, excluding that article
    ///
    /// The first row carrying `title` is the query row; it is removed from the
    /// hits by row identity, so duplicates of the article still qualify.
    pub fn recommend_by_title(&self, title: &str, top_k: usize) -> Result<RetrievalResult> {
        check_top_k(top_k)?;
        let row = self
            .corpus
            .find_title(title)
            .ok_or_else(|| ArticleCraftError::NotFound {
                what: "title",
                key: title.to_string(),
            })?;

        let query = &self.index.vectors()[row];
        let neighbors = self.index.query(query, top_k + 1)?;

        let hits = neighbors
            .into_iter()
            .filter(|n| n.row != row)
            .take(top_k)
            .map(|n| (n.row, n.distance));

        let result = self.scored(hits);
        tracing::debug!("Title '{}' (row {}) matched {} articles", title, row, result.len());
        Ok(result)
    }

    fn scored(&self, hits: impl Iterator<Item = (usize, f32)>) -> RetrievalResult {
        let metric = self.index.metric();
        let hits = hits
            .filter_map(|(row, distance)| {
                self.corpus.get(row).map(|entry| ScoredEntry {
                    row,
                    entry: entry.clone(),
                    similarity: metric.similarity(distance),
                })
            })
            .collect();
        RetrievalResult { hits }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

fn check_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(ArticleCraftError::InvalidArgument(
            "top_k must be at least 1".to_string(),
        ));
    }
    Ok(())
}
