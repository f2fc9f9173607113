/// HNSW candidate graph for approximate nearest-neighbor search
use super::Metric;
use hnsw_rs::prelude::*;

/// Upper bound on HNSW layers
const MAX_LAYERS: usize = 16;

/// Parameters for the HNSW backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HnswParams {
    /// Connections per layer
    pub m: usize,
    /// Construction beam width (higher = better recall, slower build)
    pub ef_construction: usize,
    /// Search beam width
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
        }
    }
}

/// Graph over the index rows; point ids are row numbers
pub(crate) enum CandidateGraph {
    Cosine(Hnsw<'static, f32, DistCosine>),
    Euclidean(Hnsw<'static, f32, DistL2>),
}

impl CandidateGraph {
    pub(crate) fn build(vectors: &[Vec<f32>], metric: Metric, params: &HnswParams) -> Self {
        let max_elements = vectors.len().max(1);
        let graph = match metric {
            Metric::Cosine => {
                let hnsw = Hnsw::<f32, DistCosine>::new(
                    params.m,
                    max_elements,
                    MAX_LAYERS,
                    params.ef_construction,
                    DistCosine,
                );
                for (row, vector) in vectors.iter().enumerate() {
                    hnsw.insert((vector.as_slice(), row));
                }
                Self::Cosine(hnsw)
            }
            Metric::Euclidean => {
                let hnsw = Hnsw::<f32, DistL2>::new(
                    params.m,
                    max_elements,
                    MAX_LAYERS,
                    params.ef_construction,
                    DistL2,
                );
                for (row, vector) in vectors.iter().enumerate() {
                    hnsw.insert((vector.as_slice(), row));
                }
                Self::Euclidean(hnsw)
            }
        };

        tracing::debug!(
            "Built HNSW graph over {} rows (m={}, ef_construction={})",
            vectors.len(),
            params.m,
            params.ef_construction
        );

        graph
    }

    /// Candidate rows for `query`; distances are re-scored by the caller
    pub(crate) fn candidates(&self, query: &[f32], k: usize, ef_search: usize) -> Vec<usize> {
        let ef = ef_search.max(k);
        let neighbours = match self {
            Self::Cosine(hnsw) => hnsw.search(query, k, ef),
            Self::Euclidean(hnsw) => hnsw.search(query, k, ef),
        };
        neighbours.into_iter().map(|n| n.d_id).collect()
    }
}
