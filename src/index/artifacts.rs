//! Persisted index artifacts
//!
//! A build directory holds four zstd-compressed JSON blobs and a
//! `manifest.json` recording their BLAKE3 checksums together with the index
//! shape. Blobs are written to a temporary file and renamed into place; the
//! manifest is written last. Any missing, corrupt or mismatched file makes the
//! whole directory unavailable.

use super::{IndexBackend, IndexSpec, Metric};
use crate::corpus::CorpusEntry;
use crate::embedding::{VectorizerKind, VectorizerState};
use crate::error::{ArticleCraftError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";
const VECTORIZER_FILE: &str = "vectorizer.json.zst";
const VECTORS_FILE: &str = "vectors.json.zst";
const INDEX_FILE: &str = "index.json.zst";
const CORPUS_FILE: &str = "corpus.json.zst";

const FORMAT_VERSION: u32 = 1;
const COMPRESSION_LEVEL: i32 = 3;

/// Description of a persisted build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub built_at: DateTime<Utc>,
    pub vectorizer: VectorizerKind,
    pub metric: Metric,
    pub backend: IndexBackend,
    pub dimension: usize,
    pub rows: usize,
    /// File name -> BLAKE3 hex digest of the compressed bytes
    pub checksums: BTreeMap<String, String>,
}

/// Everything needed to restore a recommendation snapshot
#[derive(Debug, Clone)]
pub struct IndexArtifacts {
    pub vectorizer: VectorizerState,
    pub vectors: Vec<Vec<f32>>,
    pub spec: IndexSpec,
    pub corpus: Vec<CorpusEntry>,
}

/// Directory-keyed artifact store
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a manifest is present (says nothing about integrity)
    pub fn exists(&self) -> bool {
        self.dir.join(MANIFEST_FILE).exists()
    }

    /// Persist a build, replacing any previous one
    pub fn save(&self, artifacts: &IndexArtifacts) -> Result<Manifest> {
        if artifacts.vectors.len() != artifacts.corpus.len() {
            return Err(ArticleCraftError::InvalidArgument(format!(
                "{} vectors for {} corpus rows",
                artifacts.vectors.len(),
                artifacts.corpus.len()
            )));
        }

        fs::create_dir_all(&self.dir).map_err(|e| {
            ArticleCraftError::io(
                e,
                format!("Failed to create artifacts directory: {}", self.dir.display()),
            )
        })?;

        let mut checksums = BTreeMap::new();
        checksums.insert(
            VECTORIZER_FILE.to_string(),
            self.write_blob(VECTORIZER_FILE, &artifacts.vectorizer)?,
        );
        checksums.insert(
            VECTORS_FILE.to_string(),
            self.write_blob(VECTORS_FILE, &artifacts.vectors)?,
        );
        checksums.insert(
            INDEX_FILE.to_string(),
            self.write_blob(INDEX_FILE, &artifacts.spec)?,
        );
        checksums.insert(
            CORPUS_FILE.to_string(),
            self.write_blob(CORPUS_FILE, &artifacts.corpus)?,
        );

        let vectorizer = match artifacts.vectorizer {
            VectorizerState::Tfidf(_) => VectorizerKind::Tfidf,
            VectorizerState::Dense { .. } => VectorizerKind::Dense,
        };

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            built_at: Utc::now(),
            vectorizer,
            metric: artifacts.spec.metric,
            backend: artifacts.spec.backend,
            dimension: artifacts.spec.dimension,
            rows: artifacts.spec.rows,
            checksums,
        };

        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| ArticleCraftError::json(e, "Failed to serialize manifest"))?;
        self.write_atomic(MANIFEST_FILE, &manifest_json)?;

        tracing::info!(
            "Saved index artifacts to {} ({} rows)",
            self.dir.display(),
            manifest.rows
        );

        Ok(manifest)
    }

    /// Read and verify the manifest
    pub fn manifest(&self) -> Result<Manifest> {
        let path = self.dir.join(MANIFEST_FILE);
        let bytes = fs::read(&path).map_err(|e| {
            ArticleCraftError::IndexUnavailable(format!(
                "Cannot read manifest {}: {}",
                path.display(),
                e
            ))
        })?;
        let manifest: Manifest = serde_json::from_slice(&bytes).map_err(|e| {
            ArticleCraftError::IndexUnavailable(format!("Corrupt manifest: {}", e))
        })?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(ArticleCraftError::IndexUnavailable(format!(
                "Unsupported artifact format version {}",
                manifest.format_version
            )));
        }
        Ok(manifest)
    }

    /// Load and verify a build
    pub fn load(&self) -> Result<IndexArtifacts> {
        let manifest = self.manifest()?;

        let vectorizer: VectorizerState = self.read_blob(&manifest, VECTORIZER_FILE)?;
        let vectors: Vec<Vec<f32>> = self.read_blob(&manifest, VECTORS_FILE)?;
        let spec: IndexSpec = self.read_blob(&manifest, INDEX_FILE)?;
        let corpus: Vec<CorpusEntry> = self.read_blob(&manifest, CORPUS_FILE)?;

        if spec.rows != manifest.rows
            || spec.dimension != manifest.dimension
            || spec.metric != manifest.metric
            || spec.backend != manifest.backend
        {
            return Err(ArticleCraftError::IndexUnavailable(
                "Index spec disagrees with manifest".to_string(),
            ));
        }
        if vectors.len() != manifest.rows || corpus.len() != manifest.rows {
            return Err(ArticleCraftError::IndexUnavailable(format!(
                "Manifest lists {} rows but found {} vectors and {} corpus entries",
                manifest.rows,
                vectors.len(),
                corpus.len()
            )));
        }

        tracing::info!(
            "Loaded index artifacts from {} ({} rows, built {})",
            self.dir.display(),
            manifest.rows,
            manifest.built_at.to_rfc3339()
        );

        Ok(IndexArtifacts {
            vectorizer,
            vectors,
            spec,
            corpus,
        })
    }

    fn write_blob<T: Serialize>(&self, name: &str, value: &T) -> Result<String> {
        let json = serde_json::to_vec(value)
            .map_err(|e| ArticleCraftError::json(e, format!("Failed to serialize {}", name)))?;
        let compressed = zstd::encode_all(&json[..], COMPRESSION_LEVEL)
            .map_err(|e| ArticleCraftError::io(e, format!("Failed to compress {}", name)))?;

        self.write_atomic(name, &compressed)?;
        Ok(blake3::hash(&compressed).to_hex().to_string())
    }

    fn read_blob<T: DeserializeOwned>(&self, manifest: &Manifest, name: &str) -> Result<T> {
        let unavailable =
            |reason: String| ArticleCraftError::IndexUnavailable(format!("{}: {}", name, reason));

        let expected = manifest
            .checksums
            .get(name)
            .ok_or_else(|| unavailable("missing from manifest".to_string()))?;

        let path = self.dir.join(name);
        let compressed = fs::read(&path).map_err(|e| unavailable(e.to_string()))?;

        let actual = blake3::hash(&compressed).to_hex().to_string();
        if &actual != expected {
            return Err(unavailable(format!(
                "checksum mismatch (expected {}, got {})",
                expected, actual
            )));
        }

        let json = zstd::decode_all(&compressed[..]).map_err(|e| unavailable(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| unavailable(e.to_string()))
    }

    /// Write to `<name>.tmp`, sync, then rename over `<name>`
    fn write_atomic(&self, name: &str, data: &[u8]) -> Result<()> {
        let final_path = self.dir.join(name);
        let temp_path = self.dir.join(format!("{}.tmp", name));

        let mut file = fs::File::create(&temp_path).map_err(|e| {
            ArticleCraftError::io(
                e,
                format!("Failed to create temp file: {}", temp_path.display()),
            )
        })?;
        file.write_all(data).map_err(|e| {
            ArticleCraftError::io(e, format!("Failed to write: {}", temp_path.display()))
        })?;
        file.sync_all().map_err(|e| {
            ArticleCraftError::io(e, format!("Failed to sync: {}", temp_path.display()))
        })?;
        drop(file);

        fs::rename(&temp_path, &final_path).map_err(|e| {
            ArticleCraftError::io(
                e,
                format!(
                    "Failed to rename {} -> {}",
                    temp_path.display(),
                    final_path.display()
                ),
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::HnswParams;
    use tempfile::TempDir;

    fn sample_artifacts() -> IndexArtifacts {
        let corpus = vec![
            CorpusEntry::new("0", "Cats", "Cats purr softly.", "cats purr softly"),
            CorpusEntry::new("1", "Dogs", "Dogs bark loudly.", "dogs bark loudly"),
        ];
        IndexArtifacts {
            vectorizer: VectorizerState::Dense {
                model: "hashing-2".to_string(),
                dimension: 2,
            },
            vectors: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            spec: IndexSpec {
                metric: Metric::Cosine,
                backend: IndexBackend::Exact,
                hnsw: HnswParams::default(),
                dimension: 2,
                rows: 2,
            },
            corpus,
        }
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().join("models"));
        assert!(!store.exists());

        let manifest = store.save(&sample_artifacts()).unwrap();
        assert_eq!(manifest.rows, 2);
        assert_eq!(manifest.checksums.len(), 4);
        assert!(store.exists());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(loaded.corpus[1].title, "Dogs");
        assert_eq!(loaded.spec.metric, Metric::Cosine);
    }

    #[test]
    fn test_missing_directory_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().join("nothing"));
        assert!(matches!(
            store.load(),
            Err(ArticleCraftError::IndexUnavailable(_))
        ));
    }

    #[test]
    fn test_corrupt_blob_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().to_path_buf());
        store.save(&sample_artifacts()).unwrap();

        fs::write(temp.path().join(VECTORS_FILE), b"garbage").unwrap();
        assert!(matches!(
            store.load(),
            Err(ArticleCraftError::IndexUnavailable(_))
        ));
    }

    #[test]
    fn test_missing_blob_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().to_path_buf());
        store.save(&sample_artifacts()).unwrap();

        fs::remove_file(temp.path().join(CORPUS_FILE)).unwrap();
        assert!(matches!(
            store.load(),
            Err(ArticleCraftError::IndexUnavailable(_))
        ));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().to_path_buf());
        store.save(&sample_artifacts()).unwrap();

        let leftovers = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
