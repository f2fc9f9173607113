//! Diversity-aware representative sampling
//!
//! A large corpus is processed in fixed-size chunks, strictly one after the
//! other. Within a chunk, rows are embedded, grouped with mini-batch k-means,
//! scored for length, vocabulary richness and distance from their cluster
//! centroid, and the best `n_per_cluster` rows of every cluster are kept.
//! Nothing from one chunk survives into the next.

mod kmeans;
mod scoring;

pub use kmeans::{Cluster, Clustering, KMeansParams, MiniBatchKMeans};
pub use scoring::{length_score, richness_scores, uniqueness_score, SampleScores};

use crate::config::SamplerConfig;
use crate::corpus::{CorpusEntry, JsonlChunks};
use crate::embedding::{has_content, EmbeddingProvider};
use crate::error::{ArticleCraftError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub const SAMPLES_FILE: &str = "representative_samples.jsonl";
pub const REPORT_FILE: &str = "sampling_report.json";

#[derive(Debug, Clone, Copy)]
pub struct SamplerSettings {
    pub chunk_size: usize,
    pub batch_size: usize,
    pub n_clusters: usize,
    pub n_per_cluster: usize,
    pub seed: u64,
    pub max_iter: usize,
}

impl From<&SamplerConfig> for SamplerSettings {
    fn from(config: &SamplerConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            batch_size: config.batch_size,
            n_clusters: config.n_clusters,
            n_per_cluster: config.n_per_cluster,
            seed: config.seed,
            max_iter: config.max_iter,
        }
    }
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            chunk_size: 10_000,
            batch_size: 32,
            n_clusters: 20,
            n_per_cluster: 5,
            seed: 42,
            max_iter: 100,
        }
    }
}

/// A selected row with where it came from and why
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampledArticle {
    pub chunk: usize,
    pub cluster: usize,
    pub id: String,
    pub title: String,
    pub text: String,
    pub clean_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub scores: SampleScores,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkStats {
    pub chunk: usize,
    pub rows: usize,
    pub dropped_empty: usize,
    pub clusters: usize,
    pub kept: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplingReport {
    pub chunks_processed: usize,
    pub chunks_skipped: usize,
    pub rows_seen: usize,
    pub rows_kept: usize,
    pub chunk_stats: Vec<ChunkStats>,
    pub duration_secs: f64,
}

pub struct RepresentativeSampler {
    settings: SamplerSettings,
    provider: Arc<dyn EmbeddingProvider>,
}

impl RepresentativeSampler {
    pub fn new(settings: SamplerSettings, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        if settings.chunk_size == 0 || settings.n_clusters == 0 || settings.n_per_cluster == 0 {
            return Err(ArticleCraftError::InvalidArgument(
                "chunk_size, n_clusters and n_per_cluster must be greater than 0".to_string(),
            ));
        }
        Ok(Self { settings, provider })
    }

    /// Sample an in-memory corpus, chunked by `chunk_size`
    pub fn sample_entries(
        &self,
        entries: Vec<CorpusEntry>,
    ) -> Result<(Vec<SampledArticle>, SamplingReport)> {
        let chunk_size = self.settings.chunk_size;
        let mut chunks = Vec::new();
        let mut iter = entries.into_iter().peekable();
        while iter.peek().is_some() {
            chunks.push(Ok(iter.by_ref().take(chunk_size).collect::<Vec<_>>()));
        }

        let mut selected = Vec::new();
        let report = self.run(chunks.into_iter(), |batch| {
            selected.extend_from_slice(batch);
            Ok(())
        })?;
        Ok((selected, report))
    }

    /// Sample a JSONL corpus, streaming selections to `output_dir`
    pub fn sample_file(&self, input: &Path, output_dir: &Path) -> Result<SamplingReport> {
        fs::create_dir_all(output_dir).map_err(|e| {
            ArticleCraftError::io(
                e,
                format!("Failed to create output directory: {}", output_dir.display()),
            )
        })?;

        let samples_path = output_dir.join(SAMPLES_FILE);
        let file = File::create(&samples_path).map_err(|e| {
            ArticleCraftError::io(e, format!("Failed to create {}", samples_path.display()))
        })?;
        let mut writer = BufWriter::new(file);

        let chunks = JsonlChunks::open(input, self.settings.chunk_size)?;
        let report = self.run(chunks, |batch| {
            for sample in batch {
                serde_json::to_writer(&mut writer, sample)
                    .map_err(|e| ArticleCraftError::json(e, "Failed to write sample"))?;
                writer
                    .write_all(b"\n")
                    .map_err(|e| ArticleCraftError::io(e, "Failed to write sample"))?;
            }
            Ok(())
        })?;
        writer
            .flush()
            .map_err(|e| ArticleCraftError::io(e, "Failed to flush samples"))?;

        let report_path: PathBuf = output_dir.join(REPORT_FILE);
        let report_json = serde_json::to_vec_pretty(&report)
            .map_err(|e| ArticleCraftError::json(e, "Failed to serialize sampling report"))?;
        fs::write(&report_path, report_json).map_err(|e| {
            ArticleCraftError::io(e, format!("Failed to write {}", report_path.display()))
        })?;

        tracing::info!("Representative samples saved to {}", samples_path.display());
        Ok(report)
    }

    /// Process chunks in order, handing each chunk's selection to `sink`
    pub fn run<I, F>(&self, chunks: I, mut sink: F) -> Result<SamplingReport>
    where
        I: Iterator<Item = Result<Vec<CorpusEntry>>>,
        F: FnMut(&[SampledArticle]) -> Result<()>,
    {
        let started = Instant::now();
        let mut report = SamplingReport::default();

        for (chunk_idx, chunk) in chunks.enumerate() {
            let entries = chunk?;
            report.rows_seen += entries.len();

            let (selected, stats) = self.sample_chunk(chunk_idx, entries)?;
            if stats.clusters == 0 {
                report.chunks_skipped += 1;
            } else {
                report.chunks_processed += 1;
            }
            report.rows_kept += selected.len();

            tracing::info!(
                "Chunk {}: {} rows, {} clusters, kept {}",
                chunk_idx,
                stats.rows,
                stats.clusters,
                stats.kept
            );

            sink(&selected)?;
            report.chunk_stats.push(stats);
        }

        report.duration_secs = started.elapsed().as_secs_f64();
        tracing::info!(
            "Sampling complete: {} of {} rows kept from {} chunks in {:.2}s",
            report.rows_kept,
            report.rows_seen,
            report.chunks_processed,
            report.duration_secs
        );

        Ok(report)
    }

    /// Select representative rows from one chunk
    pub fn sample_chunk(
        &self,
        chunk_idx: usize,
        entries: Vec<CorpusEntry>,
    ) -> Result<(Vec<SampledArticle>, ChunkStats)> {
        let total = entries.len();
        let rows: Vec<CorpusEntry> = entries
            .into_iter()
            .filter(|e| has_content(e.embedding_text()))
            .collect();

        let mut stats = ChunkStats {
            chunk: chunk_idx,
            rows: rows.len(),
            dropped_empty: total - rows.len(),
            ..Default::default()
        };

        if rows.is_empty() {
            tracing::warn!("Chunk {} has no usable rows; skipping", chunk_idx);
            return Ok((Vec::new(), stats));
        }

        let embeddings = self.embed(&rows)?;
        let dimension = self.provider.dimension();
        let flat: Vec<f32> = embeddings.iter().flatten().copied().collect();
        let matrix = Array2::from_shape_vec((rows.len(), dimension), flat).map_err(|e| {
            ArticleCraftError::Embedding(crate::embedding::EmbeddingError::GenerationError(
                format!("Embedding matrix shape: {}", e),
            ))
        })?;

        let clustering = MiniBatchKMeans::new(KMeansParams {
            n_clusters: self.settings.n_clusters,
            batch_size: self.settings.batch_size,
            max_iter: self.settings.max_iter,
            seed: self.settings.seed,
        })
        .fit(&matrix)?;

        let clean_texts: Vec<String> = rows.iter().map(|e| e.clean_text.clone()).collect();
        let richness = richness_scores(&clean_texts);

        let mut selected = Vec::new();
        for cluster in &clustering.clusters {
            if cluster.member_indices.is_empty() {
                tracing::warn!(
                    "Chunk {} cluster {} has no members; skipping",
                    chunk_idx,
                    cluster.label
                );
                continue;
            }
            stats.clusters += 1;

            let mut scored: Vec<(usize, SampleScores)> = cluster
                .member_indices
                .iter()
                .map(|&row| {
                    let scores = SampleScores::new(
                        length_score(rows[row].word_count()),
                        richness[row],
                        uniqueness_score(&embeddings[row], &cluster.centroid),
                    );
                    (row, scores)
                })
                .collect();

            scored.sort_by(|a, b| {
                b.1.combined
                    .total_cmp(&a.1.combined)
                    .then_with(|| a.0.cmp(&b.0))
            });
            scored.truncate(self.settings.n_per_cluster);

            selected.extend(scored.into_iter().map(|(row, scores)| {
                let entry = &rows[row];
                SampledArticle {
                    chunk: chunk_idx,
                    cluster: cluster.label,
                    id: entry.id.clone(),
                    title: entry.title.clone(),
                    text: entry.raw_text.clone(),
                    clean_text: entry.clean_text.clone(),
                    url: entry.url.clone(),
                    scores,
                }
            }));
        }

        stats.kept = selected.len();
        Ok((selected, stats))
    }

    fn embed(&self, rows: &[CorpusEntry]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = rows.iter().map(|e| e.embedding_text().to_string()).collect();
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.settings.batch_size.max(1)) {
            embeddings.extend(self.provider.embed_batch(batch)?);
        }
        Ok(embeddings)
    }
}
