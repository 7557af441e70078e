use crate::embeddings::Embedder;
use crate::error::{BuildError, QueryError};
use crate::models::{Chunk, IndexEntry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// On-disk layout version. Bump when the entry schema changes.
const PERSIST_VERSION: u32 = 1;

/// A retrieval hit: one index entry with its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: IndexEntry,
    pub score: f32,
}

/// Flat in-memory vector index over contract chunks.
///
/// Similarity is cosine at both build and query time. Ranking is stable:
/// entries with equal scores keep their insertion order. The index is
/// immutable once built; a rebuild produces a fresh instance rather than
/// mutating this one.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    entries: Vec<IndexEntry>,
}

#[derive(Serialize)]
struct PersistedIndex<'a> {
    version: u32,
    dimensions: usize,
    entries: &'a [IndexEntry],
}

#[derive(Deserialize)]
struct LoadedIndex {
    version: u32,
    dimensions: usize,
    entries: Vec<IndexEntry>,
}

impl FlatIndex {
    /// Embeds every chunk in bounded batches and stores the (vector, chunk)
    /// pairs. All-or-nothing: a failed batch aborts the whole build so a
    /// partially embedded corpus never becomes an index.
    pub async fn build<E: Embedder + Sync>(
        chunks: Vec<Chunk>,
        embedder: &E,
        batch_size: usize,
    ) -> Result<Self, BuildError> {
        if batch_size == 0 {
            return Err(BuildError::InvalidArgument(
                "embed batch size must be positive".to_string(),
            ));
        }

        let dimensions = embedder.dimensions();
        let mut entries = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;

            if vectors.len() != batch.len() {
                return Err(BuildError::Embedding(
                    crate::error::EmbeddingError::CountMismatch {
                        expected: batch.len(),
                        received: vectors.len(),
                    },
                ));
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                if vector.len() != dimensions {
                    return Err(BuildError::Embedding(
                        crate::error::EmbeddingError::UnexpectedDimension {
                            expected: dimensions,
                            received: vector.len(),
                        },
                    ));
                }
                entries.push(IndexEntry {
                    chunk: chunk.clone(),
                    vector,
                });
            }
        }

        info!(entry_count = entries.len(), dimensions, "vector index built");
        Ok(Self {
            dimensions,
            entries,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the top `k` entries by descending cosine similarity.
    /// Requesting more results than entries exist returns all entries.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>, QueryError> {
        if k == 0 {
            return Err(QueryError::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }
        if query_vector.len() != self.dimensions {
            return Err(QueryError::InvalidArgument(format!(
                "query vector dimension {} does not match index dimension {}",
                query_vector.len(),
                self.dimensions
            )));
        }

        let mut scored: Vec<ScoredEntry> = self
            .entries
            .iter()
            .map(|entry| ScoredEntry {
                entry: entry.clone(),
                score: cosine_similarity(query_vector, &entry.vector),
            })
            .collect();

        // Stable sort keeps insertion order for tied scores.
        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(k);
        Ok(scored)
    }

    /// Serializes the full index. The blob is written to a sibling temp
    /// file and renamed into place, so a crash or failed save never
    /// clobbers a previously good index.
    pub fn save(&self, path: &Path) -> Result<(), BuildError> {
        let persisted = PersistedIndex {
            version: PERSIST_VERSION,
            dimensions: self.dimensions,
            entries: &self.entries,
        };

        let data = serde_json::to_vec(&persisted)?;

        let mut tmp_path = path.to_path_buf();
        tmp_path.set_extension("json.tmp");
        std::fs::write(&tmp_path, data)?;
        std::fs::rename(&tmp_path, path)?;

        info!(path = %path.display(), entry_count = self.entries.len(), "vector index saved");
        Ok(())
    }

    /// Restores a prior save. Fails with `IndexNotFound` when the path has
    /// no valid save, and with `DimensionMismatch` when the persisted
    /// dimension tag disagrees with the active embedder.
    pub fn load(path: &Path, expected_dimensions: usize) -> Result<Self, BuildError> {
        let data = std::fs::read(path)
            .map_err(|_| BuildError::IndexNotFound(path.display().to_string()))?;

        let loaded: LoadedIndex = serde_json::from_slice(&data)
            .map_err(|_| BuildError::IndexNotFound(path.display().to_string()))?;

        if loaded.version != PERSIST_VERSION {
            return Err(BuildError::IndexNotFound(format!(
                "{} (unsupported layout version {})",
                path.display(),
                loaded.version
            )));
        }

        if loaded.dimensions != expected_dimensions {
            return Err(BuildError::DimensionMismatch {
                stored: loaded.dimensions,
                active: expected_dimensions,
            });
        }

        info!(path = %path.display(), entry_count = loaded.entries.len(), "vector index loaded");
        Ok(Self {
            dimensions: loaded.dimensions,
            entries: loaded.entries,
        })
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let norm_left: f32 = left.iter().map(|a| a * a).sum::<f32>().sqrt();
    let norm_right: f32 = right.iter().map(|b| b * b).sum::<f32>().sqrt();

    if norm_left == 0.0 || norm_right == 0.0 {
        0.0
    } else {
        dot / (norm_left * norm_right)
    }
}
