//! Recursive character splitter
//!
//! Splits on the coarsest separator present (paragraph, line, space, then
//! single characters), recursing into pieces that are still too long, and
//! merges neighbouring pieces back into segments of at most `chunk_size`
//! characters with up to `chunk_overlap` characters carried between
//! consecutive segments. Lengths are counted in `char`s, so multi-byte text
//! never splits inside a code point.

use crate::error::{ArticleCraftError, Result};
use std::collections::VecDeque;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ArticleCraftError::InvalidArgument(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(ArticleCraftError::InvalidArgument(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (idx, separator) = separators
            .iter()
            .enumerate()
            .find(|(_, s)| s.is_empty() || text.contains(**s))
            .map(|(i, s)| (i, *s))
            .unwrap_or((separators.len().saturating_sub(1), ""));
        let finer = &separators[(idx + 1).min(separators.len())..];

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|p| !p.is_empty()).collect()
        };

        let mut segments = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                segments.extend(self.merge(&pending, separator));
                pending.clear();
            }
            if finer.is_empty() {
                segments.push(piece.to_string());
            } else {
                segments.extend(self.split_with(piece, finer));
            }
        }

        if !pending.is_empty() {
            segments.extend(self.merge(&pending, separator));
        }
        segments
    }

    /// Greedily join pieces, keeping a tail of earlier pieces as overlap
    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut segments = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joined_len = |total: usize, window: &VecDeque<&str>| {
                total + len + if window.is_empty() { 0 } else { sep_len }
            };

            if joined_len(total, &window) > self.chunk_size && !window.is_empty() {
                push_segment(&mut segments, &window, separator);

                while total > self.chunk_overlap
                    || (joined_len(total, &window) > self.chunk_size && total > 0)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if window.is_empty() { 0 } else { sep_len };
                }
            }

            total += len + if window.is_empty() { 0 } else { sep_len };
            window.push_back(piece);
        }

        push_segment(&mut segments, &window, separator);
        segments
    }
}

fn push_segment(segments: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_segment() {
        let splitter = TextSplitter::new(100, 20).unwrap();
        assert_eq!(splitter.split("hello world"), vec!["hello world"]);
    }

    #[test]
    fn test_segments_respect_size() {
        let splitter = TextSplitter::new(50, 10).unwrap();
        let text = "word ".repeat(100);
        let segments = splitter.split(&text);
        assert!(segments.len() > 1);
        assert!(segments.iter().all(|s| s.chars().count() <= 50));
    }

    #[test]
    fn test_paragraphs_preferred() {
        let splitter = TextSplitter::new(30, 0).unwrap();
        let segments = splitter.split("first paragraph here\n\nsecond paragraph here");
        assert_eq!(segments, vec!["first paragraph here", "second paragraph here"]);
    }

    #[test]
    fn test_overlap_carries_words() {
        let splitter = TextSplitter::new(20, 10).unwrap();
        let segments = splitter.split("one two three four five six seven eight");
        assert!(segments.len() >= 2);
        assert_eq!(segments[0], "one two three four");
        assert!(segments[1].starts_with("three four"));
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let splitter = TextSplitter::new(10, 2).unwrap();
        let segments = splitter.split(&"é".repeat(25));
        assert!(segments.iter().all(|s| s.chars().count() <= 10));
        assert!(segments.len() >= 3);
    }

    #[test]
    fn test_invalid_overlap() {
        assert!(TextSplitter::new(10, 10).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
    }
}
