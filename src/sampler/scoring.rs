//! Representativeness scores; every component lies in [0, 1]
use crate::embedding::{TextVectorizer, TfidfVectorizer};
use crate::index::cosine_similarity;
use serde::{Deserialize, Serialize};

/// Words at which the length score saturates
const LENGTH_SATURATION_WORDS: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleScores {
    pub length: f32,
    pub richness: f32,
    pub uniqueness: f32,
    pub combined: f32,
}

impl SampleScores {
    pub fn new(length: f32, richness: f32, uniqueness: f32) -> Self {
        Self {
            length,
            richness,
            uniqueness,
            combined: (length + richness + uniqueness) / 3.0,
        }
    }
}

pub fn length_score(word_count: usize) -> f32 {
    (word_count as f32 / LENGTH_SATURATION_WORDS).min(1.0)
}

/// Mean TF-IDF weight over each text's non-zero terms
///
/// The vectorizer is fitted on exactly these texts, without stop words or a
/// vocabulary cap. Texts with no vocabulary terms score 0.
pub fn richness_scores(texts: &[String]) -> Vec<f32> {
    let fitted = TfidfVectorizer::new(None, false).and_then(|mut tfidf| {
        tfidf.fit(texts)?;
        Ok(tfidf)
    });

    let tfidf = match fitted {
        Ok(tfidf) => tfidf,
        Err(e) => {
            tracing::warn!("Richness scoring disabled for this chunk: {}", e);
            return vec![0.0; texts.len()];
        }
    };

    texts
        .iter()
        .map(|text| match tfidf.transform(text) {
            Ok(row) => {
                let (sum, count) = row
                    .iter()
                    .filter(|&&w| w > 0.0)
                    .fold((0.0f32, 0usize), |(s, c), &w| (s + w, c + 1));
                if count == 0 {
                    0.0
                } else {
                    (sum / count as f32).clamp(0.0, 1.0)
                }
            }
            Err(_) => 0.0,
        })
        .collect()
}

/// Distance from the cluster centroid, clamped to [0, 1]
pub fn uniqueness_score(embedding: &[f32], centroid: &[f32]) -> f32 {
    (1.0 - cosine_similarity(embedding, centroid)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_score_saturates() {
        assert_eq!(length_score(0), 0.0);
        assert!((length_score(50) - 0.5).abs() < 1e-6);
        assert_eq!(length_score(100), 1.0);
        assert_eq!(length_score(5000), 1.0);
    }

    #[test]
    fn test_richness_prefers_distinctive_vocabulary() {
        let texts = vec![
            "common common common".to_string(),
            "common rare words here".to_string(),
            "common".to_string(),
        ];
        let scores = richness_scores(&texts);
        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|&s| (0.0..=1.0).contains(&s)));
        // A single-term document has one weight of 1.0 after L2 normalization
        assert!((scores[0] - 1.0).abs() < 1e-6);
        assert!(scores[1] < scores[0]);
    }

    #[test]
    fn test_richness_on_untokenizable_chunk() {
        let texts = vec!["a".to_string(), "b".to_string()];
        assert_eq!(richness_scores(&texts), vec![0.0, 0.0]);
    }

    #[test]
    fn test_uniqueness_bounds() {
        assert!(uniqueness_score(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((uniqueness_score(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        // Opposite vectors would be 2.0 unclamped
        assert_eq!(uniqueness_score(&[1.0, 0.0], &[-1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_combined_is_mean() {
        let scores = SampleScores::new(1.0, 0.5, 0.0);
        assert!((scores.combined - 0.5).abs() < 1e-6);
    }
}
