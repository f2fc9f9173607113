//! k-nearest-neighbor similarity index
//!
//! Built once from a set of equal-dimension vectors, then queried read-only.
//! The exact backend scans every row; the HNSW backend narrows the scan to a
//! graph candidate set and re-scores it exactly. Both order results by
//! ascending distance with ties broken by lower row number.

pub mod artifacts;
mod graph;

pub use graph::HnswParams;

use crate::error::{ArticleCraftError, Result};
use graph::CandidateGraph;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Distance metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// `1 - cos(a, b)`; zero-norm vectors are at distance 1.0 from everything
    Cosine,
    Euclidean,
}

impl Metric {
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => 1.0 - cosine_similarity(a, b),
            Metric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }

    /// Convert a distance to a similarity where higher is closer
    pub fn similarity(&self, distance: f32) -> f32 {
        match self {
            Metric::Cosine => 1.0 - distance,
            Metric::Euclidean => 1.0 / (1.0 + distance),
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            other => Err(format!(
                "Unknown metric '{}', expected 'cosine' or 'euclidean'",
                other
            )),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::Euclidean => write!(f, "euclidean"),
        }
    }
}

/// Search backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    Exact,
    Hnsw,
}

impl FromStr for IndexBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exact" | "brute" => Ok(Self::Exact),
            "hnsw" => Ok(Self::Hnsw),
            other => Err(format!(
                "Unknown index backend '{}', expected 'exact' or 'hnsw'",
                other
            )),
        }
    }
}

impl fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Hnsw => write!(f, "hnsw"),
        }
    }
}

/// Cosine similarity; 0.0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// One query hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row in the index (and in the corpus it was built from)
    pub row: usize,
    pub distance: f32,
}

fn by_distance_then_row(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.row.cmp(&b.row))
}

/// Shape of an index, persisted next to its vectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub metric: Metric,
    pub backend: IndexBackend,
    pub hnsw: HnswParams,
    pub dimension: usize,
    pub rows: usize,
}

pub struct SimilarityIndex {
    vectors: Vec<Vec<f32>>,
    dimension: usize,
    metric: Metric,
    backend: IndexBackend,
    hnsw: HnswParams,
    graph: Option<CandidateGraph>,
}

impl SimilarityIndex {
    /// Build an exact index
    pub fn build(vectors: Vec<Vec<f32>>, metric: Metric) -> Result<Self> {
        Self::build_with(vectors, metric, IndexBackend::Exact, HnswParams::default())
    }

    /// Build an index with an explicit backend
    pub fn build_with(
        vectors: Vec<Vec<f32>>,
        metric: Metric,
        backend: IndexBackend,
        hnsw: HnswParams,
    ) -> Result<Self> {
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(ArticleCraftError::DimensionMismatch {
                operation: "index build",
                expected: dimension,
                actual: bad.len(),
            });
        }

        let graph = match backend {
            IndexBackend::Hnsw if !vectors.is_empty() => {
                Some(CandidateGraph::build(&vectors, metric, &hnsw))
            }
            _ => None,
        };

        tracing::info!(
            "Built {} index: {} rows, {} dimensions, {} metric",
            backend,
            vectors.len(),
            dimension,
            metric
        );

        Ok(Self {
            vectors,
            dimension,
            metric,
            backend,
            hnsw,
            graph,
        })
    }

    /// Rebuild from persisted vectors, checking them against the spec
    pub fn from_parts(vectors: Vec<Vec<f32>>, spec: &IndexSpec) -> Result<Self> {
        if vectors.len() != spec.rows {
            return Err(ArticleCraftError::IndexUnavailable(format!(
                "Index spec lists {} rows but {} vectors were loaded",
                spec.rows,
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != spec.dimension) {
            return Err(ArticleCraftError::IndexUnavailable(format!(
                "Index spec dimension is {} but a stored vector has {}",
                spec.dimension,
                bad.len()
            )));
        }
        Self::build_with(vectors, spec.metric, spec.backend, spec.hnsw)
    }

    pub fn spec(&self) -> IndexSpec {
        IndexSpec {
            metric: self.metric,
            backend: self.backend,
            hnsw: self.hnsw,
            dimension: self.dimension,
            rows: self.vectors.len(),
        }
    }

    /// The `k` nearest rows to `query`, closest first
    ///
    /// `k == 0` is rejected; `k` larger than the index returns every row.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if k == 0 {
            return Err(ArticleCraftError::InvalidArgument(
                "k must be at least 1".to_string(),
            ));
        }
        if self.vectors.is_empty() {
            tracing::warn!("Query against an empty index");
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(ArticleCraftError::DimensionMismatch {
                operation: "index query",
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let k = if k > self.vectors.len() {
            tracing::warn!(
                "Requested {} neighbors but index has only {} rows; returning all",
                k,
                self.vectors.len()
            );
            self.vectors.len()
        } else {
            k
        };

        if let Some(graph) = self.graph.as_ref().filter(|_| k < self.vectors.len()) {
            let mut candidates: Vec<Neighbor> = graph
                .candidates(query, k, self.hnsw.ef_search)
                .into_iter()
                .filter(|&row| row < self.vectors.len())
                .map(|row| self.score(query, row))
                .collect();
            candidates.sort_by(by_distance_then_row);
            candidates.dedup_by_key(|n| n.row);

            if candidates.len() >= k {
                candidates.truncate(k);
                return Ok(candidates);
            }
            tracing::debug!(
                "HNSW returned {} of {} candidates; falling back to exact scan",
                candidates.len(),
                k
            );
        }

        Ok(self.exact(query, k))
    }

    fn score(&self, query: &[f32], row: usize) -> Neighbor {
        Neighbor {
            row,
            distance: self.metric.distance(query, &self.vectors[row]),
        }
    }

    fn exact(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let mut all: Vec<Neighbor> = (0..self.vectors.len())
            .map(|row| self.score(query, row))
            .collect();
        all.sort_by(by_distance_then_row);
        all.truncate(k);
        all
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn backend(&self) -> IndexBackend {
        self.backend
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dim: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn test_cosine_orders_by_similarity() {
        let vectors = vec![unit(3, 0), unit(3, 1), vec![0.9, 0.1, 0.0]];
        let index = SimilarityIndex::build(vectors, Metric::Cosine).unwrap();

        let hits = index.query(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].row, 0);
        assert_eq!(hits[1].row, 2);
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_ties_prefer_lower_row() {
        let vectors = vec![unit(2, 1), unit(2, 0), unit(2, 0)];
        let index = SimilarityIndex::build(vectors, Metric::Cosine).unwrap();

        let hits = index.query(&[1.0, 0.0], 3).unwrap();
        let rows: Vec<usize> = hits.iter().map(|h| h.row).collect();
        assert_eq!(rows, vec![1, 2, 0]);
    }

    #[test]
    fn test_k_larger_than_index_returns_all() {
        let index = SimilarityIndex::build(vec![unit(2, 0), unit(2, 1)], Metric::Cosine).unwrap();
        assert_eq!(index.query(&[1.0, 0.0], 10).unwrap().len(), 2);
    }

    #[test]
    fn test_k_zero_rejected() {
        let index = SimilarityIndex::build(vec![unit(2, 0)], Metric::Cosine).unwrap();
        assert!(matches!(
            index.query(&[1.0, 0.0], 0),
            Err(ArticleCraftError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let index = SimilarityIndex::build(vec![unit(3, 0)], Metric::Cosine).unwrap();
        assert!(matches!(
            index.query(&[1.0, 0.0], 1),
            Err(ArticleCraftError::DimensionMismatch { .. })
        ));

        let ragged = vec![vec![1.0, 0.0], vec![1.0]];
        assert!(SimilarityIndex::build(ragged, Metric::Cosine).is_err());
    }

    #[test]
    fn test_zero_norm_is_maximally_distant() {
        let index =
            SimilarityIndex::build(vec![vec![0.0, 0.0], unit(2, 0)], Metric::Cosine).unwrap();
        let hits = index.query(&[0.0, 0.0], 2).unwrap();
        assert!(hits.iter().all(|h| (h.distance - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_euclidean_similarity() {
        let index =
            SimilarityIndex::build(vec![vec![0.0, 0.0], vec![3.0, 4.0]], Metric::Euclidean)
                .unwrap();
        let hits = index.query(&[0.0, 0.0], 2).unwrap();
        assert_eq!(hits[1].row, 1);
        assert!((hits[1].distance - 5.0).abs() < 1e-6);
        assert!((Metric::Euclidean.similarity(hits[1].distance) - 1.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_hnsw_matches_exact_on_small_index() {
        let vectors: Vec<Vec<f32>> = (0..50)
            .map(|i| {
                let angle = i as f32 * 0.1;
                vec![angle.cos(), angle.sin(), 0.5]
            })
            .collect();

        let exact = SimilarityIndex::build(vectors.clone(), Metric::Cosine).unwrap();
        let hnsw = SimilarityIndex::build_with(
            vectors,
            Metric::Cosine,
            IndexBackend::Hnsw,
            HnswParams::default(),
        )
        .unwrap();

        let query = [1.0, 0.0, 0.5];
        let a = exact.query(&query, 5).unwrap();
        let b = hnsw.query(&query, 5).unwrap();
        assert_eq!(b.len(), 5);
        assert_eq!(a[0].row, b[0].row);

        // k == len always goes through the exact path
        assert_eq!(hnsw.query(&query, 50).unwrap(), exact.query(&query, 50).unwrap());
    }

    #[test]
    fn test_spec_roundtrip() {
        let index = SimilarityIndex::build(vec![unit(2, 0), unit(2, 1)], Metric::Cosine).unwrap();
        let spec = index.spec();
        let rebuilt = SimilarityIndex::from_parts(index.vectors().to_vec(), &spec).unwrap();
        assert_eq!(rebuilt.spec(), spec);

        assert!(SimilarityIndex::from_parts(vec![unit(2, 0)], &spec).is_err());
    }

    #[test]
    fn test_parse_metric_and_backend() {
        assert_eq!("Cosine".parse::<Metric>(), Ok(Metric::Cosine));
        assert_eq!("l2".parse::<Metric>(), Ok(Metric::Euclidean));
        assert_eq!("hnsw".parse::<IndexBackend>(), Ok(IndexBackend::Hnsw));
        assert!("annoy".parse::<IndexBackend>().is_err());
    }
}
