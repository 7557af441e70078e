pub mod chunking;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod models;
pub mod orchestrator;
pub mod report;
pub mod retriever;
pub mod synthesizer;

pub use chunking::{split_document, ChunkingConfig};
pub use corpus::{discover_contract_files, load_corpus, CorpusReport, SkippedFile};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{BuildError, EmbeddingError, GenerationError, QueryError, ReportError, Result};
pub use index::{FlatIndex, ScoredEntry};
pub use models::{
    Chunk, Document, IndexEntry, PipelineConfig, QueryResult, RetrievedPassage,
};
pub use orchestrator::QaPipeline;
pub use report::JsonlReportWriter;
pub use retriever::Retriever;
pub use synthesizer::{AnswerSynthesizer, GenerationOptions, Generator, GroqGenerator, SynthesizedAnswer};
