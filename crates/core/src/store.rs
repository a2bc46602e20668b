use crate::artifact::{self, IndexManifest};
use crate::embeddings::Embedder;
use crate::index::FlatL2Index;
use crate::models::{BuildSummary, Chunk, ChunkMetadata, ScoredChunk};
use crate::IndexError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

pub const DEFAULT_TOP_K: usize = 5;

pub type SharedEmbedder = Arc<dyn Embedder>;

/// Index and metadata of one committed generation.
#[derive(Debug)]
pub struct LoadedIndex {
    pub manifest: IndexManifest,
    pub index: FlatL2Index,
}

impl LoadedIndex {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        self.index
            .search(query_vector, k)?
            .into_iter()
            .map(|(position, distance)| {
                let metadata = self.manifest.entries.get(position).cloned().ok_or_else(|| {
                    IndexError::MisalignedArtifact(format!("no metadata for vector {position}"))
                })?;
                Ok(ScoredChunk { metadata, distance })
            })
            .collect()
    }
}

/// Builds, persists and queries the flat index stored under one directory.
///
/// The embedder is injected and shared; constructing it (a model download or
/// an HTTP client) is the expensive part, so build one per process. The
/// loaded index is cached after the first search and shared read-only.
pub struct VectorIndexStore {
    dir: PathBuf,
    embedder: SharedEmbedder,
    loaded: RwLock<Option<Arc<LoadedIndex>>>,
}

impl VectorIndexStore {
    pub fn new(dir: impl Into<PathBuf>, embedder: SharedEmbedder) -> Self {
        Self {
            dir: dir.into(),
            embedder,
            loaded: RwLock::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn embedder(&self) -> &SharedEmbedder {
        &self.embedder
    }

    pub fn is_built(&self) -> bool {
        artifact::artifact_exists(&self.dir)
    }

    /// Full rebuild from `chunks`, replacing any previous artifact.
    pub fn build(&self, chunks: &[Chunk]) -> Result<BuildSummary, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::EmptyInput);
        }

        let model_id = self.embedder.model_id();
        let dimensions = self.embedder.dimensions();
        tracing::info!(chunk_count = chunks.len(), model = %model_id, "embedding chunks");

        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts)?;
        if vectors.len() != chunks.len() {
            return Err(IndexError::MisalignedArtifact(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let mut index = FlatL2Index::new(dimensions);
        for vector in &vectors {
            index.add(vector)?;
        }

        let entries = chunks.iter().map(|chunk| chunk.metadata.clone()).collect();
        let manifest = artifact::write_artifact(&self.dir, &model_id, &index, entries)?;
        let summary = BuildSummary {
            chunk_count: manifest.count,
            dimensions: manifest.dimensions,
            model_id: manifest.model_id.clone(),
            generation: manifest.generation.clone(),
        };

        self.replace_cache(Some(Arc::new(LoadedIndex { manifest, index })));
        Ok(summary)
    }

    /// Returns the cached index, loading it from disk on first use.
    pub fn load(&self) -> Result<Arc<LoadedIndex>, IndexError> {
        if let Some(loaded) = self
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(Arc::clone(loaded));
        }

        let loaded = Arc::new(self.load_from_disk()?);
        self.replace_cache(Some(Arc::clone(&loaded)));
        Ok(loaded)
    }

    /// Drops the cached index and reads the committed artifact again.
    pub fn reload(&self) -> Result<Arc<LoadedIndex>, IndexError> {
        self.replace_cache(None);
        self.load()
    }

    fn load_from_disk(&self) -> Result<LoadedIndex, IndexError> {
        let artifact = artifact::read_artifact(&self.dir)?;

        let active = self.embedder.model_id();
        if artifact.manifest.model_id != active {
            return Err(IndexError::ModelMismatch {
                built_with: artifact.manifest.model_id,
                active,
            });
        }
        if artifact.manifest.dimensions != self.embedder.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: self.embedder.dimensions(),
                actual: artifact.manifest.dimensions,
            });
        }

        tracing::info!(
            dir = %self.dir.display(),
            count = artifact.manifest.count,
            generation = %artifact.manifest.generation,
            "index loaded"
        );
        Ok(LoadedIndex {
            manifest: artifact.manifest,
            index: artifact.index,
        })
    }

    fn replace_cache(&self, value: Option<Arc<LoadedIndex>>) {
        *self.loaded.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    pub fn search_scored(&self, query_text: &str, k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        let loaded = self.load()?;
        let query_vector = self.embedder.embed(query_text)?;
        let hits = loaded.search(&query_vector, k)?;
        tracing::debug!(k, found = hits.len(), "vector search");
        Ok(hits)
    }

    pub fn search(&self, query_text: &str, k: usize) -> Result<Vec<ChunkMetadata>, IndexError> {
        Ok(self
            .search_scored(query_text, k)?
            .into_iter()
            .map(|hit| hit.metadata)
            .collect())
    }

    /// Search that never fails: a missing or unreadable index is logged and
    /// reported as no results.
    pub fn search_or_empty(&self, query_text: &str, k: usize) -> Vec<ChunkMetadata> {
        match self.search(query_text, k) {
            Ok(hits) => hits,
            Err(IndexError::IndexNotFound(dir)) => {
                tracing::warn!(%dir, "index not built yet; returning no context");
                Vec::new()
            }
            Err(error) => {
                tracing::error!(%error, "vector search failed; returning no context");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use tempfile::tempdir;

    fn chunk(source: &str, page: u32, ordinal: usize, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: ChunkMetadata::new(source, page, ordinal, text.to_string()),
        }
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            chunk("cardio.pdf", 1, 0, "Beta blockers reduce heart rate and blood pressure."),
            chunk("cardio.pdf", 1, 1, "ACE inhibitors may cause a persistent dry cough."),
            chunk("diabetes.pdf", 3, 0, "Metformin is first-line therapy for type 2 diabetes."),
            chunk("diabetes.pdf", 4, 0, "Insulin doses are adjusted to fasting glucose readings."),
            chunk("renal.pdf", 2, 0, "Reduce nephrotoxic drugs when kidney function declines."),
        ]
    }

    fn store_in(dir: &Path) -> VectorIndexStore {
        VectorIndexStore::new(dir, Arc::new(CharacterNgramEmbedder::default()))
    }

    #[test]
    fn building_from_nothing_fails_and_keeps_prior_artifact() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = store_in(dir.path());

        assert!(matches!(store.build(&[]), Err(IndexError::EmptyInput)));
        assert!(!store.is_built());

        let summary = store.build(&corpus())?;
        let manifest_before = std::fs::read(artifact::manifest_path(dir.path()))?;

        assert!(matches!(store.build(&[]), Err(IndexError::EmptyInput)));
        assert_eq!(std::fs::read(artifact::manifest_path(dir.path()))?, manifest_before);
        assert_eq!(store.reload()?.manifest.generation, summary.generation);
        Ok(())
    }

    #[test]
    fn self_query_returns_chunk_first_at_zero_distance() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let chunks = corpus();
        let store = store_in(dir.path());
        store.build(&chunks)?;

        for expected in &chunks {
            let hits = store.search_scored(&expected.text, 3)?;
            assert_eq!(hits[0].metadata, expected.metadata);
            assert!(hits[0].distance.abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn search_results_are_bounded_known_and_sorted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let chunks = corpus();
        let store = store_in(dir.path());
        store.build(&chunks)?;

        let hits = store.search_scored("which drug lowers glucose in diabetes", 3)?;
        assert_eq!(hits.len(), 3);
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        for hit in &hits {
            assert!(chunks.iter().any(|chunk| chunk.metadata == hit.metadata));
        }

        let all = store.search("kidney", 50)?;
        assert_eq!(all.len(), chunks.len());
        assert!(store.search("kidney", 0)?.is_empty());
        Ok(())
    }

    #[test]
    fn fresh_store_reads_the_persisted_artifact() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let chunks = corpus();
        store_in(dir.path()).build(&chunks)?;

        let reader = store_in(dir.path());
        let hits = reader.search(&chunks[2].text, 1)?;
        assert_eq!(hits, vec![chunks[2].metadata.clone()]);
        assert_eq!(hits[0].text, chunks[2].text);
        Ok(())
    }

    #[test]
    fn missing_artifact_is_typed_and_degrades_to_empty() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir.path().join("never-built"));

        assert!(matches!(store.search("anything", 5), Err(IndexError::IndexNotFound(_))));
        assert!(store.search_or_empty("anything", 5).is_empty());
    }

    #[test]
    fn embedder_swap_is_detected_at_load() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        store_in(dir.path()).build(&corpus())?;

        let other = VectorIndexStore::new(
            dir.path(),
            Arc::new(CharacterNgramEmbedder { dimensions: 64 }),
        );
        assert!(matches!(
            other.search("beta blockers", 2),
            Err(IndexError::ModelMismatch { .. })
        ));
        assert!(other.search_or_empty("beta blockers", 2).is_empty());
        Ok(())
    }

    #[test]
    fn corrupt_artifact_degrades_to_empty() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        store_in(dir.path()).build(&corpus())?;
        std::fs::write(artifact::manifest_path(dir.path()), b"garbage")?;

        let reader = store_in(dir.path());
        assert!(matches!(reader.search("cough", 2), Err(IndexError::IndexLoad(_))));
        assert!(reader.search_or_empty("cough", 2).is_empty());
        Ok(())
    }

    #[test]
    fn rebuild_replaces_cached_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = store_in(dir.path());
        store.build(&corpus())?;
        assert_eq!(store.load()?.len(), 5);

        store.build(&corpus()[..2])?;
        assert_eq!(store.load()?.len(), 2);
        assert_eq!(store.search("diabetes", 10)?.len(), 2);
        Ok(())
    }
}
