use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Maps text to fixed-dimensionality vectors. All vectors produced by one
/// embedder configuration share the same length; the index relies on this
/// when checking dimensions at load time.
#[async_trait]
pub trait Embedder {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embeds a batch in one call. Callers bound batch sizes themselves;
    /// implementations must return exactly one vector per input, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

#[async_trait]
impl<T: Embedder + Sync + ?Sized> Embedder for &T {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        (**self).embed_batch(texts).await
    }
}

/// Deterministic local embedder over hashed character trigrams, normalized
/// to unit length. No external service, so it doubles as the offline and
/// test embedder.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_sync(text)).collect())
    }
}

/// Client for an OpenAI-compatible `/embeddings` endpoint (hosted
/// sentence-transformer serving, text-embeddings-inference, and the like).
pub struct HttpEmbedder {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
    client: Client,
}

impl HttpEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
            dimensions,
            client: Client::new(),
        }
    }

    async fn request_embeddings(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.endpoint))
            .json(&json!({
                "model": self.model,
                "input": inputs,
            }));

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(EmbeddingError::BackendResponse {
                backend: "embeddings".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let rows = parsed
            .pointer("/data")
            .and_then(Value::as_array)
            .ok_or_else(|| EmbeddingError::BackendResponse {
                backend: "embeddings".to_string(),
                details: "response missing data array".to_string(),
            })?;

        let mut vectors = Vec::with_capacity(rows.len());
        for row in rows {
            let values = row
                .pointer("/embedding")
                .and_then(Value::as_array)
                .ok_or_else(|| EmbeddingError::BackendResponse {
                    backend: "embeddings".to_string(),
                    details: "row missing embedding".to_string(),
                })?;

            let vector: Vec<f32> = values
                .iter()
                .filter_map(Value::as_f64)
                .map(|value| value as f32)
                .collect();

            if vector.len() != self.dimensions {
                return Err(EmbeddingError::UnexpectedDimension {
                    expected: self.dimensions,
                    received: vector.len(),
                });
            }
            vectors.push(vector);
        }

        if vectors.len() != inputs.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: inputs.len(),
                received: vectors.len(),
            });
        }

        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.request_embeddings(&[text.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            received: 0,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request_embeddings(texts).await
    }
}
