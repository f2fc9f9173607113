//! Seeded mini-batch k-means with k-means++ initialization
use crate::error::{ArticleCraftError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy)]
pub struct KMeansParams {
    pub n_clusters: usize,
    pub batch_size: usize,
    pub max_iter: usize,
    pub seed: u64,
}

/// Members of one cluster; `centroid` is the mean of the member rows
#[derive(Debug, Clone)]
pub struct Cluster {
    pub label: usize,
    pub member_indices: Vec<usize>,
    pub centroid: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct Clustering {
    /// Cluster label per input row
    pub labels: Vec<usize>,
    /// One entry per label, possibly with no members
    pub clusters: Vec<Cluster>,
}

pub struct MiniBatchKMeans {
    params: KMeansParams,
}

impl MiniBatchKMeans {
    pub fn new(params: KMeansParams) -> Self {
        Self { params }
    }

    /// Cluster the rows of `data` into `min(n_clusters, rows)` groups
    pub fn fit(&self, data: &Array2<f32>) -> Result<Clustering> {
        let n_rows = data.nrows();
        if n_rows == 0 {
            return Err(ArticleCraftError::InvalidArgument(
                "Cannot cluster zero rows".to_string(),
            ));
        }
        if self.params.n_clusters == 0 {
            return Err(ArticleCraftError::InvalidArgument(
                "n_clusters must be greater than 0".to_string(),
            ));
        }

        let k = self.params.n_clusters.min(n_rows);
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut centers = init_plus_plus(data, k, &mut rng);

        let batch_size = self.params.batch_size.clamp(1, n_rows);
        let mut counts = vec![0usize; k];

        for _ in 0..self.params.max_iter {
            for _ in 0..batch_size {
                let row = rng.gen_range(0..n_rows);
                let x = data.row(row);
                let c = nearest(&centers, x);
                counts[c] += 1;
                let eta = 1.0 / counts[c] as f32;
                let mut center = centers.row_mut(c);
                center.zip_mut_with(&x, |m, &v| *m += eta * (v - *m));
            }
        }

        let labels: Vec<usize> = data.outer_iter().map(|x| nearest(&centers, x)).collect();

        let clusters = (0..k)
            .map(|label| {
                let member_indices: Vec<usize> = labels
                    .iter()
                    .enumerate()
                    .filter(|(_, &l)| l == label)
                    .map(|(row, _)| row)
                    .collect();
                let centroid = if member_indices.is_empty() {
                    centers.row(label).to_vec()
                } else {
                    data.select(Axis(0), &member_indices)
                        .mean_axis(Axis(0))
                        .map(|m| m.to_vec())
                        .unwrap_or_else(|| centers.row(label).to_vec())
                };
                Cluster {
                    label,
                    member_indices,
                    centroid,
                }
            })
            .collect();

        Ok(Clustering { labels, clusters })
    }
}

fn squared_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Index of the closest center; ties go to the lower label
fn nearest(centers: &Array2<f32>, x: ArrayView1<f32>) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (c, center) in centers.outer_iter().enumerate() {
        let d = squared_distance(center, x);
        if d < best_dist {
            best = c;
            best_dist = d;
        }
    }
    best
}

fn init_plus_plus(data: &Array2<f32>, k: usize, rng: &mut StdRng) -> Array2<f32> {
    let n_rows = data.nrows();
    let mut chosen = vec![rng.gen_range(0..n_rows)];
    let mut min_dist: Array1<f32> = data
        .outer_iter()
        .map(|x| squared_distance(x, data.row(chosen[0])))
        .collect();

    while chosen.len() < k {
        let total: f32 = min_dist.sum();
        let next = if total > 0.0 {
            let mut target = rng.gen::<f32>() * total;
            let mut pick = n_rows - 1;
            for (row, &d) in min_dist.iter().enumerate() {
                if target < d {
                    pick = row;
                    break;
                }
                target -= d;
            }
            pick
        } else {
            // Remaining points coincide with chosen centers
            (0..n_rows).find(|r| !chosen.contains(r)).unwrap_or(0)
        };

        chosen.push(next);
        for (row, x) in data.outer_iter().enumerate() {
            let d = squared_distance(x, data.row(next));
            if d < min_dist[row] {
                min_dist[row] = d;
            }
        }
    }

    data.select(Axis(0), &chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Array2<f32> {
        let mut rows = Vec::new();
        for i in 0..10 {
            let jitter = i as f32 * 0.01;
            rows.extend_from_slice(&[0.0 + jitter, 0.0]);
        }
        for i in 0..10 {
            let jitter = i as f32 * 0.01;
            rows.extend_from_slice(&[10.0 + jitter, 10.0]);
        }
        Array2::from_shape_vec((20, 2), rows).unwrap()
    }

    fn params(n_clusters: usize) -> KMeansParams {
        KMeansParams {
            n_clusters,
            batch_size: 8,
            max_iter: 50,
            seed: 42,
        }
    }

    #[test]
    fn test_separates_blobs() {
        let clustering = MiniBatchKMeans::new(params(2)).fit(&blobs()).unwrap();
        assert_eq!(clustering.clusters.len(), 2);

        let first = clustering.labels[0];
        assert!(clustering.labels[..10].iter().all(|&l| l == first));
        assert!(clustering.labels[10..].iter().all(|&l| l != first));

        for cluster in &clustering.clusters {
            assert_eq!(cluster.member_indices.len(), 10);
        }
    }

    #[test]
    fn test_clusters_clamped_to_rows() {
        let data = Array2::from_shape_vec((3, 1), vec![0.0, 1.0, 2.0]).unwrap();
        let clustering = MiniBatchKMeans::new(params(20)).fit(&data).unwrap();
        assert_eq!(clustering.clusters.len(), 3);
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let a = MiniBatchKMeans::new(params(3)).fit(&blobs()).unwrap();
        let b = MiniBatchKMeans::new(params(3)).fit(&blobs()).unwrap();
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn test_centroid_is_member_mean() {
        let clustering = MiniBatchKMeans::new(params(2)).fit(&blobs()).unwrap();
        let cluster = clustering
            .clusters
            .iter()
            .find(|c| c.member_indices.contains(&0))
            .unwrap();
        assert!((cluster.centroid[0] - 0.045).abs() < 1e-4);
        assert!(cluster.centroid[1].abs() < 1e-6);
    }

    #[test]
    fn test_identical_points() {
        let data = Array2::from_shape_vec((4, 2), vec![1.0; 8]).unwrap();
        let clustering = MiniBatchKMeans::new(params(2)).fit(&data).unwrap();
        assert_eq!(clustering.labels.len(), 4);
        assert!(MiniBatchKMeans::new(params(2))
            .fit(&Array2::zeros((0, 2)))
            .is_err());
    }
}
