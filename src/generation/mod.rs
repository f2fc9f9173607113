//! Retrieval-augmented article generation
//!
//! A sample of the corpus is cut into overlapping segments and indexed. To
//! write an article for a title, the segments most relevant to the title are
//! retrieved, packed into a bounded context block and sent with a fixed prompt
//! to the completion backend in a single, time-limited call.

mod backend;
mod chunking;
mod prompt;

pub use backend::{BackendError, CompletionBackend, OpenAiCompatibleBackend};
pub use chunking::TextSplitter;
pub use prompt::render as render_prompt;

use crate::config::GenerationConfig;
use crate::corpus::CorpusEntry;
use crate::embedding::{restore_vectorizer, EmbeddingProvider, TextVectorizer};
use crate::error::{ArticleCraftError, Result};
use crate::index::artifacts::IndexArtifacts;
use crate::index::{Metric, SimilarityIndex};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// What to return when the completion backend fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Surface the backend error
    None,
    /// Return the most relevant retrieved segment verbatim
    NearestReference,
}

impl FromStr for FallbackStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "nearest_reference" => Ok(Self::NearestReference),
            other => Err(format!(
                "Unknown fallback strategy '{}'. Must be one of: none, nearest_reference",
                other
            )),
        }
    }
}

impl fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::NearestReference => write!(f, "nearest_reference"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub sample_size: usize,
    pub sample_seed: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_context_chars: usize,
    pub num_similar_articles: usize,
    pub exclude_same_title: bool,
    pub fallback: FallbackStrategy,
    pub timeout: Duration,
}

impl From<&GenerationConfig> for GenerationSettings {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            sample_size: config.sample_size,
            sample_seed: config.sample_seed,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            max_context_chars: config.max_context_chars,
            num_similar_articles: config.num_similar_articles,
            exclude_same_title: config.exclude_same_title,
            fallback: config.fallback,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            sample_size: 1000,
            sample_seed: 42,
            chunk_size: 1000,
            chunk_overlap: 200,
            max_context_chars: 6000,
            num_similar_articles: 3,
            exclude_same_title: true,
            fallback: FallbackStrategy::None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// One retrieved segment and the article it was cut from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSegment {
    pub title: String,
    pub text: String,
    pub similarity: f32,
}

/// Segment index over a corpus sample
pub struct ReferenceIndex {
    vectorizer: Arc<dyn TextVectorizer>,
    index: SimilarityIndex,
    /// Segment rows; `title` is the source article, both texts hold the segment
    segments: Vec<CorpusEntry>,
}

impl ReferenceIndex {
    /// Sample `sample_size` articles and index their segments
    pub fn build(
        entries: &[CorpusEntry],
        settings: &GenerationSettings,
        mut vectorizer: Box<dyn TextVectorizer>,
    ) -> Result<Self> {
        let started = Instant::now();
        let splitter = TextSplitter::new(settings.chunk_size, settings.chunk_overlap)?;
        let sampled = sample_entries(entries, settings.sample_size, settings.sample_seed);

        let mut segments = Vec::new();
        for entry in &sampled {
            let document = format!("Title: {}\n\n{}", entry.title, entry.raw_text);
            for (n, segment) in splitter.split(&document).into_iter().enumerate() {
                segments.push(CorpusEntry::new(
                    format!("{}:{}", entry.id, n),
                    entry.title.clone(),
                    segment.clone(),
                    segment,
                ));
            }
        }

        if segments.is_empty() {
            return Err(ArticleCraftError::GenerationUnavailable(
                "Reference corpus produced no segments".to_string(),
            ));
        }

        let texts: Vec<String> = segments.iter().map(|s| s.raw_text.clone()).collect();
        vectorizer.fit(&texts)?;
        let vectors = vectorizer.transform_batch(&texts)?;
        let index = SimilarityIndex::build(vectors, Metric::Cosine)?;

        tracing::info!(
            "Reference index built: {} articles, {} segments, {:.2}s",
            sampled.len(),
            segments.len(),
            started.elapsed().as_secs_f64()
        );

        Ok(Self {
            vectorizer: Arc::from(vectorizer),
            index,
            segments,
        })
    }

    pub fn from_artifacts(
        artifacts: IndexArtifacts,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        batch_size: usize,
    ) -> Result<Self> {
        let vectorizer = restore_vectorizer(artifacts.vectorizer, provider, batch_size)?;
        let index = SimilarityIndex::from_parts(artifacts.vectors, &artifacts.spec)?;
        if index.len() != artifacts.corpus.len() {
            return Err(ArticleCraftError::IndexUnavailable(format!(
                "Reference index has {} vectors for {} segments",
                index.len(),
                artifacts.corpus.len()
            )));
        }

        Ok(Self {
            vectorizer: Arc::from(vectorizer),
            index,
            segments: artifacts.corpus,
        })
    }

    pub fn to_artifacts(&self) -> Result<IndexArtifacts> {
        Ok(IndexArtifacts {
            vectorizer: self.vectorizer.state()?,
            vectors: self.index.vectors().to_vec(),
            spec: self.index.spec(),
            corpus: self.segments.clone(),
        })
    }

    /// The `k` segments most similar to `query`, best first
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedSegment>> {
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.vectorizer.transform(query)?;
        let neighbors = self.index.query(&vector, k)?;

        Ok(neighbors
            .into_iter()
            .filter_map(|n| {
                self.segments.get(n.row).map(|segment| RetrievedSegment {
                    title: segment.title.clone(),
                    text: segment.raw_text.clone(),
                    similarity: self.index.metric().similarity(n.distance),
                })
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

fn sample_entries(entries: &[CorpusEntry], n: usize, seed: u64) -> Vec<CorpusEntry> {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    if n >= entries.len() {
        return entries.to_vec();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = rand::seq::index::sample(&mut rng, entries.len(), n).into_vec();
    rows.sort_unstable();
    rows.into_iter().map(|row| entries[row].clone()).collect()
}

/// Result of one generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub request_id: Uuid,
    pub title: String,
    pub segments: Vec<RetrievedSegment>,
    pub retrieved_context: String,
    pub prompt_text: String,
    pub completion_text: String,
    pub elapsed_seconds: f64,
    pub fallback_used: bool,
}

impl GenerationResponse {
    /// Source article titles in relevance order, without repeats
    pub fn reference_titles(&self) -> Vec<String> {
        let mut seen = AHashSet::new();
        self.segments
            .iter()
            .filter(|s| seen.insert(s.title.as_str()))
            .map(|s| s.title.clone())
            .collect()
    }
}

pub struct ArticleGenerator {
    settings: GenerationSettings,
    backend: Arc<dyn CompletionBackend>,
    index: Option<Arc<ReferenceIndex>>,
}

impl ArticleGenerator {
    pub fn new(settings: GenerationSettings, backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            settings,
            backend,
            index: None,
        }
    }

    pub fn with_index(mut self, index: Option<Arc<ReferenceIndex>>) -> Self {
        self.index = index;
        self
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Generate an article for `title` using `num_similar` reference segments
    pub async fn generate(&self, title: &str, num_similar: usize) -> Result<GenerationResponse> {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        let title = title.trim();

        if title.is_empty() {
            return Err(ArticleCraftError::InvalidArgument(
                "Title must not be empty".to_string(),
            ));
        }
        if num_similar == 0 {
            return Err(ArticleCraftError::InvalidArgument(
                "num_similar must be at least 1".to_string(),
            ));
        }

        let index = match &self.index {
            Some(index) if !index.is_empty() => index,
            _ => {
                return Err(ArticleCraftError::GenerationUnavailable(
                    "Reference index is not built".to_string(),
                ))
            }
        };

        let retrieved = self.retrieve(index, title, num_similar)?;
        let retrieved_count = retrieved.len();
        let (segments, retrieved_context) = self.assemble_context(retrieved);
        if retrieved_count > 0 && segments.is_empty() {
            return Err(ArticleCraftError::GenerationUnavailable(format!(
                "No reference segment fits within {} context characters",
                self.settings.max_context_chars
            )));
        }
        let prompt_text = prompt::render(&retrieved_context, title);

        tracing::info!(
            request_id = %request_id,
            title = %title,
            segments = segments.len(),
            context_chars = retrieved_context.chars().count(),
            model = %self.backend.model(),
            "Generating article"
        );

        let outcome = match tokio::time::timeout(
            self.settings.timeout,
            self.backend.complete(&prompt_text),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.settings.timeout)),
        };

        let (completion_text, fallback_used) = match outcome {
            Ok(text) => (text, false),
            Err(e) => match (self.settings.fallback, segments.first()) {
                (FallbackStrategy::NearestReference, Some(nearest)) => {
                    tracing::warn!(
                        request_id = %request_id,
                        error = %e,
                        "Completion failed; returning nearest reference segment"
                    );
                    (nearest.text.clone(), true)
                }
                _ => {
                    tracing::error!(request_id = %request_id, error = %e, "Completion failed");
                    return Err(e.into());
                }
            },
        };

        let elapsed_seconds = started.elapsed().as_secs_f64();
        tracing::info!(
            request_id = %request_id,
            elapsed_seconds,
            fallback_used,
            "Article generated"
        );

        Ok(GenerationResponse {
            request_id,
            title: title.to_string(),
            segments,
            retrieved_context,
            prompt_text,
            completion_text,
            elapsed_seconds,
            fallback_used,
        })
    }

    /// Best `n` segments after dropping repeats and, optionally, segments of
    /// the requested article itself; over-fetches until enough survive
    fn retrieve(
        &self,
        index: &ReferenceIndex,
        title: &str,
        n: usize,
    ) -> Result<Vec<RetrievedSegment>> {
        let wanted_title = normalize_title(title);
        let mut fetch = n.saturating_mul(3).max(n + 5);

        loop {
            let fetch_k = fetch.min(index.len());
            let mut seen = AHashSet::new();
            let kept: Vec<RetrievedSegment> = index
                .search(title, fetch_k)?
                .into_iter()
                .filter(|s| {
                    !(self.settings.exclude_same_title && normalize_title(&s.title) == wanted_title)
                })
                .filter(|s| seen.insert(s.text.clone()))
                .take(n)
                .collect();

            if kept.len() >= n || fetch_k >= index.len() {
                if kept.len() < n {
                    tracing::debug!("Only {} of {} reference segments qualified", kept.len(), n);
                }
                return Ok(kept);
            }
            fetch = fetch.saturating_mul(2);
        }
    }

    /// Join segments best-first, skipping any that would overflow the bound.
    /// Returns the segments that made it into the context with the context.
    fn assemble_context(
        &self,
        segments: Vec<RetrievedSegment>,
    ) -> (Vec<RetrievedSegment>, String) {
        const SEPARATOR: &str = "\n\n";
        let limit = self.settings.max_context_chars;
        let mut placed = Vec::with_capacity(segments.len());
        let mut context = String::new();
        let mut used = 0usize;

        for segment in segments {
            let len = segment.text.chars().count();
            let extra = if context.is_empty() { len } else { len + SEPARATOR.len() };
            if used + extra > limit {
                tracing::debug!("Dropping {}-char segment from '{}'", len, segment.title);
                continue;
            }
            if !context.is_empty() {
                context.push_str(SEPARATOR);
            }
            context.push_str(&segment.text);
            used += extra;
            placed.push(segment);
        }
        (placed, context)
    }
}

fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Default markdown file name for a generated article
pub fn article_file_name(title: &str) -> String {
    format!("{}.md", title.trim().replace(' ', "_"))
}

/// Write a generated article as markdown
pub fn save_article(title: &str, content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            ArticleCraftError::io(e, format!("Failed to create directory: {:?}", parent))
        })?;
    }
    std::fs::write(path, format!("# {}\n\n{}", title, content))
        .map_err(|e| ArticleCraftError::io(e, format!("Failed to write article: {:?}", path)))?;
    tracing::info!("Article saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::TfidfVectorizer;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct ScriptedBackend {
        reply: std::result::Result<String, String>,
        delay: Duration,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                delay: Duration::ZERO,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err("boom".to_string()),
                delay: Duration::ZERO,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, prompt: &str) -> std::result::Result<String, BackendError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone().map_err(BackendError::Transport)
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn corpus() -> Vec<CorpusEntry> {
        vec![
            CorpusEntry::new("1", "Cats", "Cats are lovely pets that purr.", ""),
            CorpusEntry::new("2", "Dogs", "Dogs are loyal pets that bark.", ""),
            CorpusEntry::new("3", "Markets", "Stock markets fell sharply today.", ""),
            CorpusEntry::new("4", "Cats again", "Cats are lovely pets that purr.", ""),
        ]
    }

    fn reference(settings: &GenerationSettings) -> Arc<ReferenceIndex> {
        reference_over(&corpus(), settings)
    }

    fn reference_over(entries: &[CorpusEntry], settings: &GenerationSettings) -> Arc<ReferenceIndex> {
        let vectorizer = Box::new(TfidfVectorizer::new(None, true).unwrap());
        Arc::new(ReferenceIndex::build(entries, settings, vectorizer).unwrap())
    }

    fn generator(backend: ScriptedBackend, settings: GenerationSettings) -> ArticleGenerator {
        let index = reference(&settings);
        ArticleGenerator::new(settings, Arc::new(backend)).with_index(Some(index))
    }

    #[test]
    fn test_fallback_parse() {
        assert_eq!(
            "nearest_reference".parse::<FallbackStrategy>(),
            Ok(FallbackStrategy::NearestReference)
        );
        assert!("retry".parse::<FallbackStrategy>().is_err());
        assert_eq!(FallbackStrategy::None.to_string(), "none");
    }

    #[test]
    fn test_segments_carry_title_prefix() {
        let index = reference(&GenerationSettings::default());
        assert_eq!(index.len(), 4);
        let hits = index.search("markets", 1).unwrap();
        assert!(hits[0].text.starts_with("Title: Markets\n\n"));
    }

    #[tokio::test]
    async fn test_generate_excludes_same_title_and_duplicates() {
        let settings = GenerationSettings::default();
        let gen = generator(ScriptedBackend::replying("An article."), settings);

        let response = gen.generate("cats", 3).await.unwrap();
        assert_eq!(response.completion_text, "An article.");
        assert!(!response.fallback_used);
        assert!(response.segments.iter().all(|s| s.title.to_lowercase() != "cats"));
        assert!(response.prompt_text.contains("TITLE TO GENERATE ARTICLE FOR:\ncats"));
        assert!(response.prompt_text.contains(&response.retrieved_context));
    }

    #[tokio::test]
    async fn test_repeated_segment_texts_dropped() {
        let mut entries = corpus();
        entries.push(CorpusEntry::new("5", "Dogs", "Dogs are loyal pets that bark.", ""));
        let settings = GenerationSettings::default();
        let index = reference_over(&entries, &settings);
        assert_eq!(index.len(), 5);

        let gen = ArticleGenerator::new(settings, Arc::new(ScriptedBackend::replying("ok")))
            .with_index(Some(index));
        let response = gen.generate("loyal pets", 4).await.unwrap();

        assert_eq!(response.segments.len(), 4);
        let texts: AHashSet<&str> = response.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts.len(), 4);
        assert_eq!(
            response.segments.iter().filter(|s| s.title == "Dogs").count(),
            1
        );
        assert_eq!(response.retrieved_context.matches("Title: Dogs\n\n").count(), 1);
    }

    #[tokio::test]
    async fn test_context_bound() {
        let settings = GenerationSettings {
            max_context_chars: 60,
            ..Default::default()
        };
        let gen = generator(ScriptedBackend::replying("ok"), settings);
        let response = gen.generate("pets", 3).await.unwrap();
        assert!(response.retrieved_context.chars().count() <= 60);
    }

    #[tokio::test]
    async fn test_only_placed_segments_are_reported() {
        let settings = GenerationSettings {
            max_context_chars: 60,
            ..Default::default()
        };
        let gen = generator(ScriptedBackend::replying("ok"), settings);
        let response = gen.generate("pets", 3).await.unwrap();

        assert_eq!(response.segments.len(), 1);
        assert_eq!(response.retrieved_context, response.segments[0].text);
        assert_eq!(response.reference_titles(), vec![response.segments[0].title.clone()]);
    }

    #[tokio::test]
    async fn test_no_segment_fits_context_bound() {
        let settings = GenerationSettings {
            max_context_chars: 10,
            ..Default::default()
        };
        let backend = Arc::new(ScriptedBackend::replying("unused"));
        let gen = ArticleGenerator::new(settings.clone(), backend.clone())
            .with_index(Some(reference(&settings)));

        assert!(matches!(
            gen.generate("pets", 2).await,
            Err(ArticleCraftError::GenerationUnavailable(_))
        ));
        assert!(backend.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_without_index() {
        let gen = ArticleGenerator::new(
            GenerationSettings::default(),
            Arc::new(ScriptedBackend::replying("unused")),
        );
        assert!(matches!(
            gen.generate("Cats", 3).await,
            Err(ArticleCraftError::GenerationUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces() {
        let gen = generator(ScriptedBackend::failing(), GenerationSettings::default());
        assert!(matches!(
            gen.generate("Dogs", 2).await,
            Err(ArticleCraftError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_backend_error() {
        let settings = GenerationSettings {
            timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let backend = ScriptedBackend {
            delay: Duration::from_secs(5),
            ..ScriptedBackend::replying("late")
        };
        let gen = generator(backend, settings);
        assert!(matches!(
            gen.generate("Dogs", 2).await,
            Err(ArticleCraftError::Backend(BackendError::Timeout(_)))
        ));
    }

    #[tokio::test]
    async fn test_nearest_reference_fallback() {
        let settings = GenerationSettings {
            fallback: FallbackStrategy::NearestReference,
            ..Default::default()
        };
        let gen = generator(ScriptedBackend::failing(), settings);
        let response = gen.generate("Dogs", 2).await.unwrap();
        assert!(response.fallback_used);
        assert_eq!(response.completion_text, response.segments[0].text);
    }

    #[test]
    fn test_save_article() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(article_file_name("My New Article"));
        save_article("My New Article", "Body text.", &path).unwrap();

        assert!(path.ends_with("My_New_Article.md"));
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "# My New Article\n\nBody text.");
    }
}
