//! Article corpus: entries, normalization and sources
//!
//! Rows come from a JSONL export (`jsonl`) or the SQLite article table
//! (`store`). Row position is the identity used by every index built over a
//! corpus, so a [`Corpus`] never reorders its entries.

pub mod jsonl;
pub mod store;

pub use jsonl::{read_corpus, ArticleRecord, JsonlChunks};
pub use store::ArticleStore;

use crate::error::{ArticleCraftError, Result};
use ahash::AHashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub id: String,
    pub title: String,
    pub raw_text: String,
    pub clean_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Pre-lemmatized text, preferred for embedding when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lemmatized: Option<String>,
}

impl CorpusEntry {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        raw_text: impl Into<String>,
        clean_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            raw_text: raw_text.into(),
            clean_text: clean_text.into(),
            url: None,
            lemmatized: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Text fed to dense embedders: lemmatized when available
    pub fn embedding_text(&self) -> &str {
        match self.lemmatized.as_deref() {
            Some(lemma) if !lemma.trim().is_empty() => lemma,
            _ => &self.clean_text,
        }
    }

    /// Whitespace-separated words in the raw text
    pub fn word_count(&self) -> usize {
        self.raw_text.split_whitespace().count()
    }
}

/// Lowercases, strips everything but letters, digits and whitespace, and
/// collapses runs of whitespace
pub struct TextNormalizer {
    strip: Regex,
    spaces: Regex,
}

impl TextNormalizer {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                ArticleCraftError::Config(format!("Invalid normalization pattern: {}", e))
            })
        };

        Ok(Self {
            strip: compile(r"[^\p{L}\p{N}\s]+")?,
            spaces: compile(r"\s+")?,
        })
    }

    pub fn normalize(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let stripped = self.strip.replace_all(&lowered, " ");
        self.spaces.replace_all(&stripped, " ").trim().to_string()
    }

    /// Build an entry, deriving `clean_text` from the raw text
    pub fn entry(
        &self,
        id: impl Into<String>,
        title: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> CorpusEntry {
        let raw_text = raw_text.into();
        let clean_text = self.normalize(&raw_text);
        CorpusEntry::new(id, title, raw_text, clean_text)
    }
}

/// Immutable, row-ordered collection of entries with a title lookup
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    entries: Vec<CorpusEntry>,
    /// Title -> first row carrying it
    by_title: AHashMap<String, usize>,
}

impl Corpus {
    pub fn new(entries: Vec<CorpusEntry>) -> Self {
        let mut by_title = AHashMap::with_capacity(entries.len());
        for (row, entry) in entries.iter().enumerate() {
            by_title.entry(entry.title.clone()).or_insert(row);
        }
        Self { entries, by_title }
    }

    pub fn get(&self, row: usize) -> Option<&CorpusEntry> {
        self.entries.get(row)
    }

    /// First row whose title matches exactly
    pub fn find_title(&self, title: &str) -> Option<usize> {
        self.by_title.get(title).copied()
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<CorpusEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The clean text of every row, in row order
    pub fn clean_texts(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.clean_text.clone()).collect()
    }

    /// Seeded sample of at most `n` rows, kept in corpus order
    pub fn sample(&self, n: usize, seed: u64) -> Vec<&CorpusEntry> {
        if n >= self.entries.len() {
            return self.entries.iter().collect();
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut rows = rand::seq::index::sample(&mut rng, self.entries.len(), n).into_vec();
        rows.sort_unstable();
        rows.into_iter().map(|row| &self.entries[row]).collect()
    }
}
