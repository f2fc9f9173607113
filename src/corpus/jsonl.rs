//! JSONL corpus reader
//!
//! One article per line: `{"title", "text", "clean_text"?, "lemmatized"?,
//! "url"?, "id"?}`. Missing `clean_text` is derived by normalization and a
//! missing `id` becomes the zero-based line row. Malformed lines are skipped
//! with a warning.

use super::{CorpusEntry, TextNormalizer};
use crate::error::{ArticleCraftError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

/// A corpus row as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub clean_text: Option<String>,
    #[serde(default)]
    pub lemmatized: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl ArticleRecord {
    pub fn into_entry(self, row: usize, normalizer: &TextNormalizer) -> CorpusEntry {
        let clean_text = match self.clean_text {
            Some(clean) => clean,
            None => normalizer.normalize(&self.text),
        };

        CorpusEntry {
            id: self.id.unwrap_or_else(|| row.to_string()),
            title: self.title,
            raw_text: self.text,
            clean_text,
            url: self.url,
            lemmatized: self.lemmatized,
        }
    }
}

impl From<&CorpusEntry> for ArticleRecord {
    fn from(entry: &CorpusEntry) -> Self {
        Self {
            id: Some(entry.id.clone()),
            title: entry.title.clone(),
            text: entry.raw_text.clone(),
            clean_text: Some(entry.clean_text.clone()),
            lemmatized: entry.lemmatized.clone(),
            url: entry.url.clone(),
        }
    }
}

/// Read a whole JSONL corpus into memory
pub fn read_corpus(path: &Path) -> Result<Vec<CorpusEntry>> {
    let mut entries = Vec::new();
    for chunk in JsonlChunks::open(path, 10_000)? {
        entries.extend(chunk?);
    }

    tracing::info!("Read {} articles from {}", entries.len(), path.display());
    Ok(entries)
}

/// Iterator over fixed-size chunks of a JSONL corpus
///
/// Only one chunk is materialized at a time.
pub struct JsonlChunks {
    lines: Lines<BufReader<File>>,
    normalizer: TextNormalizer,
    chunk_size: usize,
    /// Next data row (blank lines are not rows)
    row: usize,
    line_no: usize,
    skipped: usize,
}

impl JsonlChunks {
    pub fn open(path: &Path, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ArticleCraftError::InvalidArgument(
                "chunk_size must be greater than 0".to_string(),
            ));
        }

        let file = File::open(path).map_err(|e| {
            ArticleCraftError::io(e, format!("Failed to open corpus: {}", path.display()))
        })?;

        Ok(Self {
            lines: BufReader::new(file).lines(),
            normalizer: TextNormalizer::new()?,
            chunk_size,
            row: 0,
            line_no: 0,
            skipped: 0,
        })
    }

    /// Lines skipped as malformed so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for JsonlChunks {
    type Item = Result<Vec<CorpusEntry>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut chunk = Vec::with_capacity(self.chunk_size.min(1024));

        while chunk.len() < self.chunk_size {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    return Some(Err(ArticleCraftError::io(
                        e,
                        format!("Failed to read corpus line {}", self.line_no + 1),
                    )))
                }
                None => break,
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<ArticleRecord>(&line) {
                Ok(record) => {
                    chunk.push(record.into_entry(self.row, &self.normalizer));
                    self.row += 1;
                }
                Err(e) => {
                    self.skipped += 1;
                    tracing::warn!("Skipping malformed corpus line {}: {}", self.line_no, e);
                }
            }
        }

        if chunk.is_empty() {
            None
        } else {
            Some(Ok(chunk))
        }
    }
}
