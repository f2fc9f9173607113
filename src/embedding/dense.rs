/// Dense sentence-embedding vectorizer backed by an [`EmbeddingProvider`]
use super::{has_content, EmbeddingProvider, TextVectorizer, VectorizerKind, VectorizerState};
use crate::error::{ArticleCraftError, Result};
use std::sync::Arc;

pub struct DenseVectorizer {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    fitted: bool,
}

impl DenseVectorizer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            fitted: false,
        }
    }

    /// Restore a vectorizer whose provider matches the persisted model
    pub fn restore(
        provider: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
        model: &str,
        dimension: usize,
    ) -> Result<Self> {
        if provider.model_name() != model {
            return Err(ArticleCraftError::IndexUnavailable(format!(
                "Index was built with model '{}' but '{}' is configured",
                model,
                provider.model_name()
            )));
        }
        if provider.dimension() != dimension {
            return Err(ArticleCraftError::DimensionMismatch {
                operation: "restore dense vectorizer",
                expected: dimension,
                actual: provider.dimension(),
            });
        }

        let mut vectorizer = Self::new(provider, batch_size);
        vectorizer.fitted = true;
        Ok(vectorizer)
    }

    fn ensure_fitted(&self) -> Result<()> {
        if self.fitted {
            Ok(())
        } else {
            Err(ArticleCraftError::NotFitted(
                "Dense vectorizer used before fit".to_string(),
            ))
        }
    }
}

impl TextVectorizer for DenseVectorizer {
    fn kind(&self) -> VectorizerKind {
        VectorizerKind::Dense
    }

    fn fit(&mut self, _corpus: &[String]) -> Result<()> {
        self.fitted = true;
        Ok(())
    }

    /// Texts without any token map to the zero vector
    fn transform(&self, text: &str) -> Result<Vec<f32>> {
        self.ensure_fitted()?;
        if !has_content(text) {
            return Ok(vec![0.0; self.provider.dimension()]);
        }
        Ok(self.provider.embed(text)?)
    }

    fn transform_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.ensure_fitted()?;

        // Empty rows keep their position with a zero vector
        let mut vectors = vec![vec![0.0; self.provider.dimension()]; texts.len()];
        let positions: Vec<usize> = (0..texts.len())
            .filter(|&row| has_content(&texts[row]))
            .collect();
        if positions.len() < texts.len() {
            tracing::warn!(
                "{} of {} texts have no content; using zero vectors",
                texts.len() - positions.len(),
                texts.len()
            );
        }

        let mut done = 0usize;
        for (batch_num, rows) in positions.chunks(self.batch_size).enumerate() {
            let batch: Vec<String> = rows.iter().map(|&row| texts[row].clone()).collect();
            let embedded = self.provider.embed_batch(&batch)?;
            if embedded.len() != rows.len() {
                return Err(ArticleCraftError::DimensionMismatch {
                    operation: "dense batch size",
                    expected: rows.len(),
                    actual: embedded.len(),
                });
            }
            for (&row, vector) in rows.iter().zip(embedded) {
                vectors[row] = vector;
            }
            done += rows.len();
            tracing::debug!(
                "Embedded batch {} ({} texts, {}/{} done)",
                batch_num + 1,
                rows.len(),
                done,
                positions.len()
            );
        }
        Ok(vectors)
    }

    fn dimension(&self) -> Result<usize> {
        Ok(self.provider.dimension())
    }

    fn state(&self) -> Result<VectorizerState> {
        self.ensure_fitted()?;
        Ok(VectorizerState::Dense {
            model: self.provider.model_name().to_string(),
            dimension: self.provider.dimension(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingProvider;

    fn provider() -> Arc<dyn EmbeddingProvider> {
        Arc::new(HashingProvider::new(32).unwrap())
    }

    #[test]
    fn test_requires_fit() {
        let vectorizer = DenseVectorizer::new(provider(), 4);
        assert!(matches!(
            vectorizer.transform("hello world"),
            Err(ArticleCraftError::NotFitted(_))
        ));
    }

    #[test]
    fn test_batches_preserve_order() {
        let mut vectorizer = DenseVectorizer::new(provider(), 2);
        vectorizer.fit(&[]).unwrap();

        let texts: Vec<String> = (0..5).map(|i| format!("document number {}", i)).collect();
        let batched = vectorizer.transform_batch(&texts).unwrap();
        assert_eq!(batched.len(), 5);
        for (text, vector) in texts.iter().zip(&batched) {
            assert_eq!(&vectorizer.transform(text).unwrap(), vector);
        }
    }

    #[test]
    fn test_empty_texts_get_zero_vectors_in_place() {
        let mut vectorizer = DenseVectorizer::new(provider(), 2);
        vectorizer.fit(&[]).unwrap();

        let texts = vec![
            "cats are pets".to_string(),
            "".to_string(),
            "dogs are pets".to_string(),
            "?! \u{2014}".to_string(),
            "markets rise".to_string(),
        ];
        let vectors = vectorizer.transform_batch(&texts).unwrap();
        assert_eq!(vectors.len(), 5);
        assert!(vectors[1].iter().all(|&x| x == 0.0));
        assert!(vectors[3].iter().all(|&x| x == 0.0));
        assert_eq!(vectors[2], vectorizer.transform("dogs are pets").unwrap());
        assert_eq!(vectors[4], vectorizer.transform("markets rise").unwrap());
        assert!(vectorizer.transform("...").unwrap().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_restore_checks_model() {
        assert!(DenseVectorizer::restore(provider(), 4, "hashing-32", 32).is_ok());
        assert!(DenseVectorizer::restore(provider(), 4, "all-MiniLM-L6-v2", 32).is_err());
        assert!(DenseVectorizer::restore(provider(), 4, "hashing-32", 64).is_err());
    }
}
