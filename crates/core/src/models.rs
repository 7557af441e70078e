use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A source contract as handed to the build pipeline. Extraction to clean
/// text (plain files, markdown, PDF pages) happens upstream; the core only
/// sees `(id, text, metadata)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub title: String,
    pub source_path: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub checksum: String,
    pub loaded_at: DateTime<Utc>,
}

/// A bounded contiguous span of a document's text, the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: String,
    /// Human-readable source label used for citations, typically the file name.
    pub source_label: String,
    pub chunk_index: u64,
    /// Character offset of this chunk within the source document.
    pub start_offset: usize,
    pub text: String,
    /// Section heading the chunk falls under, when one was detected.
    pub section: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl Chunk {
    /// Chunk length in characters, the unit chunking is measured in.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// A chunk paired with its embedding vector: the unit of storage and
/// retrieval in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Caller-facing projection of a retrieval hit. Internal chunk ids are
/// dropped; only text, provenance, and the similarity score remain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    pub source_label: String,
    pub section: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub score: f32,
}

/// The record handed to the reporting sink for one answered question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub question: String,
    pub answer: String,
    pub passages: Vec<RetrievedPassage>,
    /// Deduplicated source labels of the passages supplied to the model,
    /// in retrieval order.
    pub sources: Vec<String>,
    pub answered_at: DateTime<Utc>,
}

/// Recognized pipeline options. Defaults suit contract-sized prose:
/// 800-char chunks, 120-char overlap, top 4 passages per question.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunk_chars: usize,
    pub overlap_chars: usize,
    pub top_k: usize,
    pub embed_batch_size: usize,
    pub index_path: std::path::PathBuf,
    /// Rebuild-versus-load is a caller decision, never inferred.
    pub rebuild: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_chars: 800,
            overlap_chars: 120,
            top_k: 4,
            embed_batch_size: 32,
            index_path: std::path::PathBuf::from("qa_index.json"),
            rebuild: false,
        }
    }
}
