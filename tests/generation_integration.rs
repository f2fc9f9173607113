/// Generation integration: reference index build, retrieval and the scripted backend
use articlecraft::config::Config;
use articlecraft::corpus::CorpusEntry;
use articlecraft::embedding::{EmbeddingProvider, HashingProvider, VectorizerKind};
use articlecraft::generation::{BackendError, CompletionBackend, FallbackStrategy};
use articlecraft::service::ArticleServices;
use articlecraft::ArticleCraftError;
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Records prompts and answers from a script
struct ScriptedBackend {
    answer: Option<String>,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answer
            .clone()
            .ok_or_else(|| BackendError::Transport("connection refused".to_string()))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

fn config(root: &Path, vectorizer: VectorizerKind) -> Config {
    let mut config = Config::default();
    config.storage.artifacts_dir = root.join("models");
    config.storage.database_file = root.join("articles.sqlite");
    config.generation.reference_dir = root.join("vector_db");
    config.generation.vectorizer = vectorizer;
    config.generation.chunk_size = 120;
    config.generation.chunk_overlap = 20;
    config.embedding.model = "hashing-64".to_string();
    config
}

fn corpus() -> Vec<CorpusEntry> {
    let paragraph = |topic: &str| {
        format!(
            "{topic} have a long history.\n\n{topic} are studied by many people around the world.\n\nWriting about {topic} takes care."
        )
    };
    vec![
        CorpusEntry::new("0", "Cats", paragraph("Cats"), ""),
        CorpusEntry::new("1", "Dogs", paragraph("Dogs"), ""),
        CorpusEntry::new("2", "Bonds", paragraph("Bonds"), ""),
    ]
}

fn services(
    root: &Path,
    vectorizer: VectorizerKind,
    answer: Option<&str>,
) -> (ArticleServices, Arc<ScriptedBackend>) {
    let backend = Arc::new(ScriptedBackend {
        answer: answer.map(str::to_string),
        prompts: Mutex::new(Vec::new()),
    });
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(64).unwrap());
    let completion: Arc<dyn CompletionBackend> = backend.clone();
    let services =
        ArticleServices::with_components(config(root, vectorizer), Some(provider), Some(completion));
    (services, backend)
}

#[tokio::test]
async fn test_generate_with_dense_reference_index() {
    let temp = TempDir::new().unwrap();
    let (services, backend) = services(temp.path(), VectorizerKind::Dense, Some("Fresh article"));
    let reference = services.build_reference(&corpus()).unwrap();
    assert!(reference.len() > 3);

    let article = services.generate_article("Cats", Some(2)).await.unwrap();
    assert_eq!(article.content, "Fresh article");
    assert!(!article.fallback_used);
    assert!(!article.reference_titles.contains(&"Cats".to_string()));

    let prompts = backend.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("REFERENCE ARTICLES:\n"));
    assert!(prompts[0].contains("TITLE TO GENERATE ARTICLE FOR:\nCats"));
}

#[tokio::test]
async fn test_generation_unavailable_without_reference_index() {
    let temp = TempDir::new().unwrap();
    let (services, backend) = services(temp.path(), VectorizerKind::Tfidf, Some("unused"));
    services.initialize();

    assert!(matches!(
        services.generate_article("Cats", Some(2)).await,
        Err(ArticleCraftError::GenerationUnavailable(_))
    ));
    assert!(backend.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_backend_failure_and_fallback() {
    let temp = TempDir::new().unwrap();
    let (failing, _) = services(temp.path(), VectorizerKind::Tfidf, None);
    failing.build_reference(&corpus()).unwrap();
    assert!(matches!(
        failing.generate_article("Dogs", Some(1)).await,
        Err(ArticleCraftError::Backend(_))
    ));

    let mut cfg = config(temp.path(), VectorizerKind::Tfidf);
    cfg.generation.fallback = FallbackStrategy::NearestReference;
    let backend: Arc<dyn CompletionBackend> = Arc::new(ScriptedBackend {
        answer: None,
        prompts: Mutex::new(Vec::new()),
    });
    let with_fallback = ArticleServices::with_components(cfg, None, Some(backend));
    let availability = with_fallback.initialize();
    assert!(availability.generator);

    let article = with_fallback.generate_article("Dogs", Some(1)).await.unwrap();
    assert!(article.fallback_used);
    assert!(!article.content.is_empty());
    assert_eq!(article.reference_titles.len(), 1);
    assert_ne!(article.reference_titles[0], "Dogs");
}
