//! Sparse keyword vectorizer (TF-IDF)
//!
//! Tokens come from a tantivy analyzer chain (simple tokenizer, long-token
//! removal, lowercasing and optionally English stop words). The vocabulary is
//! capped at `max_features` terms ranked by corpus frequency; IDF is smoothed
//! as `ln((1 + n) / (1 + df)) + 1` and every output row is L2-normalized.

use super::{TextVectorizer, VectorizerKind, VectorizerState};
use crate::error::{ArticleCraftError, Result};
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use tantivy::tokenizer::{
    Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, StopWordFilter, TextAnalyzer,
    TokenStream,
};

/// Tokens longer than this are dropped by the analyzer
const MAX_TOKEN_LEN: usize = 40;

/// Serializable fitted state of a [`TfidfVectorizer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfState {
    pub max_features: Option<usize>,
    pub stop_words: bool,
    /// Terms in column order (lexicographic)
    pub terms: Vec<String>,
    /// IDF weight per column
    pub idf: Vec<f32>,
}

pub struct TfidfVectorizer {
    max_features: Option<usize>,
    stop_words: bool,
    analyzer: TextAnalyzer,
    vocabulary: AHashMap<String, usize>,
    terms: Vec<String>,
    idf: Vec<f32>,
    fitted: bool,
}

impl TfidfVectorizer {
    /// Create an unfitted vectorizer
    ///
    /// `max_features = None` keeps the whole vocabulary.
    pub fn new(max_features: Option<usize>, stop_words: bool) -> Result<Self> {
        if max_features == Some(0) {
            return Err(ArticleCraftError::InvalidArgument(
                "max_features must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            max_features,
            stop_words,
            analyzer: build_analyzer(stop_words)?,
            vocabulary: AHashMap::new(),
            terms: Vec::new(),
            idf: Vec::new(),
            fitted: false,
        })
    }

    /// Rebuild a fitted vectorizer from persisted state
    pub fn from_state(state: TfidfState) -> Result<Self> {
        if state.terms.len() != state.idf.len() {
            return Err(ArticleCraftError::IndexUnavailable(format!(
                "TF-IDF state has {} terms but {} idf weights",
                state.terms.len(),
                state.idf.len()
            )));
        }

        let mut vectorizer = Self::new(state.max_features, state.stop_words)?;
        vectorizer.vocabulary = state
            .terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
        vectorizer.terms = state.terms;
        vectorizer.idf = state.idf;
        vectorizer.fitted = true;
        Ok(vectorizer)
    }

    /// Vocabulary in column order
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut analyzer = self.analyzer.clone();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while stream.advance() {
            let token = &stream.token().text;
            // Single characters carry no keyword signal
            if token.chars().count() >= 2 {
                tokens.push(token.clone());
            }
        }
        tokens
    }
}

fn build_analyzer(stop_words: bool) -> Result<TextAnalyzer> {
    let analyzer = if stop_words {
        let stop_filter = StopWordFilter::new(Language::English).ok_or_else(|| {
            ArticleCraftError::Config("English stop word list unavailable".to_string())
        })?;
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
            .filter(LowerCaser)
            .filter(stop_filter)
            .build()
    } else {
        TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(MAX_TOKEN_LEN))
            .filter(LowerCaser)
            .build()
    };
    Ok(analyzer)
}

impl TextVectorizer for TfidfVectorizer {
    fn kind(&self) -> VectorizerKind {
        VectorizerKind::Tfidf
    }

    fn fit(&mut self, corpus: &[String]) -> Result<()> {
        let n_docs = corpus.len();
        let mut term_counts: AHashMap<String, usize> = AHashMap::new();
        let mut doc_freq: AHashMap<String, usize> = AHashMap::new();

        for doc in corpus {
            let tokens = self.tokenize(doc);
            let mut seen: AHashSet<&str> = AHashSet::new();
            for token in &tokens {
                *term_counts.entry(token.clone()).or_insert(0) += 1;
                if seen.insert(token.as_str()) {
                    *doc_freq.entry(token.clone()).or_insert(0) += 1;
                }
            }
        }

        if term_counts.is_empty() {
            return Err(ArticleCraftError::InvalidArgument(format!(
                "Empty vocabulary after tokenizing {} documents",
                n_docs
            )));
        }

        let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(cap) = self.max_features {
            ranked.truncate(cap);
        }

        let mut terms: Vec<String> = ranked.into_iter().map(|(term, _)| term).collect();
        terms.sort();

        let n = n_docs as f32;
        self.idf = terms
            .iter()
            .map(|t| {
                let df = doc_freq.get(t).copied().unwrap_or(0) as f32;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();
        self.vocabulary = terms.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();
        self.terms = terms;
        self.fitted = true;

        tracing::debug!(
            "Fitted TF-IDF on {} documents ({} terms)",
            n_docs,
            self.terms.len()
        );

        Ok(())
    }

    fn transform(&self, text: &str) -> Result<Vec<f32>> {
        if !self.fitted {
            return Err(ArticleCraftError::NotFitted(
                "TF-IDF transform called before fit".to_string(),
            ));
        }

        let mut row = vec![0.0f32; self.terms.len()];
        for token in self.tokenize(text) {
            if let Some(&col) = self.vocabulary.get(&token) {
                row[col] += 1.0;
            }
        }

        for (value, idf) in row.iter_mut().zip(&self.idf) {
            *value *= idf;
        }

        let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            row.iter_mut().for_each(|x| *x /= norm);
        }

        Ok(row)
    }

    fn dimension(&self) -> Result<usize> {
        if !self.fitted {
            return Err(ArticleCraftError::NotFitted(
                "TF-IDF dimension unknown before fit".to_string(),
            ));
        }
        Ok(self.terms.len())
    }

    fn state(&self) -> Result<VectorizerState> {
        if !self.fitted {
            return Err(ArticleCraftError::NotFitted(
                "Cannot persist an unfitted TF-IDF vectorizer".to_string(),
            ));
        }
        Ok(VectorizerState::Tfidf(TfidfState {
            max_features: self.max_features,
            stop_words: self.stop_words,
            terms: self.terms.clone(),
            idf: self.idf.clone(),
        }))
    }
}
