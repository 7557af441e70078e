use thiserror::Error;

/// Failures raised while talking to an embedding backend.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding backend {backend} rejected request: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("embedding count {received} does not match input count {expected}")]
    CountMismatch { expected: usize, received: usize },

    #[error("embedding dimension {received} does not match configured {expected}")]
    UnexpectedDimension { expected: usize, received: usize },
}

/// Failures raised while calling the generative model.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation backend {backend} rejected request: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("generation response had no completion text")]
    EmptyCompletion,
}

/// Build-phase failures. Builds are all-or-nothing: any of these aborts
/// the whole build without publishing or overwriting an index.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("embedding failed during index build: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no persisted index found at {0}")]
    IndexNotFound(String),

    #[error("persisted index dimension {stored} does not match active embedder dimension {active}")]
    DimensionMismatch { stored: usize, active: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failures while handing a query result off to the reporting sink.
/// Distinct from the build/query split: a sink failure loses one record,
/// never an index or an answer.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Query-phase failures. Each question fails independently; a batch
/// reports partial results rather than aborting.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("embedding failed for query: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("answer generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("no index available yet: {0}")]
    NotReady(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T, E = BuildError> = std::result::Result<T, E>;
