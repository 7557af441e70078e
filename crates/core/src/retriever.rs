use crate::embeddings::Embedder;
use crate::error::QueryError;
use crate::index::FlatIndex;
use crate::models::RetrievedPassage;
use std::sync::Arc;

/// Embeds a query with the same embedder configuration the index was built
/// with and returns the top-k passages, projected to the caller-facing
/// shape. Deterministic for a fixed index and a deterministic embedder;
/// with a non-deterministic embedder the order of tied scores may vary.
pub struct Retriever<E: Embedder> {
    index: Arc<FlatIndex>,
    embedder: E,
}

impl<E: Embedder + Sync> Retriever<E> {
    pub fn new(index: Arc<FlatIndex>, embedder: E) -> Self {
        Self { index, embedder }
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::InvalidArgument("query is empty".to_string()));
        }

        let query_vector = self.embedder.embed(query).await?;
        let hits = self.index.search(&query_vector, k)?;

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedPassage {
                text: hit.entry.chunk.text,
                source_label: hit.entry.chunk.source_label,
                section: hit.entry.chunk.section,
                metadata: hit.entry.chunk.metadata,
                score: hit.score,
            })
            .collect())
    }
}
