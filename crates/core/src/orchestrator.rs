use crate::chunking::{split_document, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::{BuildError, QueryError};
use crate::index::FlatIndex;
use crate::models::{Document, PipelineConfig, QueryResult};
use crate::retriever::Retriever;
use crate::synthesizer::{AnswerSynthesizer, Generator};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

/// Composes chunker, embedder, and vector index at build time, and
/// retriever plus answer synthesizer at query time.
///
/// A build constructs the new index fully before publishing it, so queries
/// either see the previous complete index or the new one, never a half
/// built state. Questions are read-only against the published index and a
/// batch of them runs concurrently, each failing independently.
pub struct QaPipeline<E: Embedder, G: Generator> {
    config: PipelineConfig,
    embedder: E,
    synthesizer: AnswerSynthesizer<G>,
    index: Option<Arc<FlatIndex>>,
}

impl<E, G> QaPipeline<E, G>
where
    E: Embedder + Sync,
    G: Generator + Sync,
{
    pub fn new(config: PipelineConfig, embedder: E, synthesizer: AnswerSynthesizer<G>) -> Self {
        Self {
            config,
            embedder,
            synthesizer,
            index: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.index.is_some()
    }

    pub fn indexed_entries(&self) -> usize {
        self.index.as_ref().map_or(0, |index| index.len())
    }

    /// Full rebuild over the given documents: chunk, embed, persist, then
    /// publish. Any stage failure aborts the whole build; the previously
    /// published index (and any prior save on disk) stays intact.
    pub async fn build_index(&mut self, documents: &[Document]) -> Result<usize, BuildError> {
        let chunking = ChunkingConfig::new(self.config.chunk_chars, self.config.overlap_chars);
        chunking.validate()?;

        let mut chunks = Vec::new();
        for document in documents {
            chunks.extend(split_document(document, chunking)?);
        }

        info!(
            document_count = documents.len(),
            chunk_count = chunks.len(),
            "chunked corpus"
        );

        let index = FlatIndex::build(chunks, &self.embedder, self.config.embed_batch_size).await?;
        index.save(&self.config.index_path)?;

        let entry_count = index.len();
        self.index = Some(Arc::new(index));
        Ok(entry_count)
    }

    /// Loads the persisted index and publishes it, enforcing the embedder
    /// dimension check.
    pub fn load_index(&mut self) -> Result<usize, BuildError> {
        let index = FlatIndex::load(&self.config.index_path, self.embedder.dimensions())?;
        let entry_count = index.len();
        self.index = Some(Arc::new(index));
        Ok(entry_count)
    }

    /// Applies the caller's rebuild-versus-load policy: rebuild when the
    /// config says so, otherwise load, falling back to a rebuild when no
    /// usable save exists.
    pub async fn ensure_index(&mut self, documents: &[Document]) -> Result<usize, BuildError> {
        if self.config.rebuild {
            return self.build_index(documents).await;
        }

        match self.load_index() {
            Ok(entry_count) => Ok(entry_count),
            Err(error @ (BuildError::IndexNotFound(_) | BuildError::DimensionMismatch { .. })) => {
                warn!(reason = %error, "persisted index unusable, rebuilding");
                self.build_index(documents).await
            }
            Err(error) => Err(error),
        }
    }

    /// Answers one question against the published index.
    pub async fn ask(&self, question: &str) -> Result<QueryResult, QueryError> {
        let index = self.index.as_ref().ok_or_else(|| {
            QueryError::NotReady("no index has been built or loaded".to_string())
        })?;

        let retriever = Retriever::new(Arc::clone(index), &self.embedder);
        let passages = retriever.retrieve(question, self.config.top_k).await?;

        let answer = self.synthesizer.answer(question, &passages).await?;

        // Deduplicate while preserving retrieval order.
        let mut sources: Vec<String> = Vec::new();
        for passage in &passages {
            if !sources.contains(&passage.source_label) {
                sources.push(passage.source_label.clone());
            }
        }

        Ok(QueryResult {
            question: question.to_string(),
            answer: answer.text,
            passages,
            sources,
            answered_at: Utc::now(),
        })
    }

    /// Answers a batch of independent questions concurrently. Each question
    /// succeeds or fails on its own; one failure never aborts the rest.
    pub async fn ask_many(&self, questions: &[String]) -> Vec<Result<QueryResult, QueryError>> {
        join_all(questions.iter().map(|question| self.ask(question))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::GenerationError;
    use crate::synthesizer::GenerationOptions;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    struct CannedGenerator;

    #[async_trait]
    impl Generator for CannedGenerator {
        async fn complete(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            Ok("Breach notification is required within 72 hours [dpa_compliant.txt].".to_string())
        }
    }

    /// Fails whenever the prompt mentions the poisoned marker.
    struct SelectivelyFailingGenerator;

    #[async_trait]
    impl Generator for SelectivelyFailingGenerator {
        async fn complete(
            &self,
            prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            if prompt.contains("poisoned") {
                Err(GenerationError::BackendResponse {
                    backend: "groq".to_string(),
                    details: "500 Internal Server Error".to_string(),
                })
            } else {
                Ok("An answer grounded in the passages.".to_string())
            }
        }
    }

    fn document(id: &str, title: &str, text: &str) -> Document {
        Document {
            document_id: id.to_string(),
            title: title.to_string(),
            source_path: format!("/contracts/{title}"),
            text: text.to_string(),
            metadata: BTreeMap::new(),
            checksum: "checksum".to_string(),
            loaded_at: Utc::now(),
        }
    }

    fn corpus() -> Vec<Document> {
        vec![
            document(
                "doc-a",
                "dpa_compliant.txt",
                "4. BREACH NOTIFICATION\n\nThe processor shall report any personal data \
                 breach notification within 72 hours of becoming aware of the incident.",
            ),
            document(
                "doc-b",
                "vendor_agreement.txt",
                "5. PAYMENT\n\nInvoices are payable within thirty days of receipt. Late \
                 payments accrue interest at the statutory rate.",
            ),
        ]
    }

    fn pipeline_config(index_path: std::path::PathBuf) -> PipelineConfig {
        PipelineConfig {
            chunk_chars: 200,
            overlap_chars: 40,
            top_k: 1,
            embed_batch_size: 8,
            index_path,
            rebuild: true,
        }
    }

    fn pipeline<G: Generator + Sync>(
        index_path: std::path::PathBuf,
        generator: G,
    ) -> QaPipeline<CharacterNgramEmbedder, G> {
        QaPipeline::new(
            pipeline_config(index_path),
            CharacterNgramEmbedder { dimensions: 128 },
            AnswerSynthesizer::new(generator, GenerationOptions::default()),
        )
    }

    #[tokio::test]
    async fn asking_before_any_index_is_not_ready() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path().join("index.json"), CannedGenerator);

        let result = pipeline.ask("Any question").await;
        assert!(matches!(result, Err(QueryError::NotReady(_))));
    }

    #[tokio::test]
    async fn build_then_ask_grounds_the_answer_in_the_right_contract() {
        let dir = tempdir().unwrap();
        let mut pipeline = pipeline(dir.path().join("index.json"), CannedGenerator);

        let entry_count = pipeline.build_index(&corpus()).await.unwrap();
        assert!(entry_count > 0);
        assert!(pipeline.is_ready());

        let result = pipeline.ask("breach notification timeframe").await.unwrap();
        assert_eq!(result.sources, vec!["dpa_compliant.txt".to_string()]);
        assert!(!result.answer.is_empty());
        assert_eq!(result.passages.len(), 1);
    }

    #[tokio::test]
    async fn rebuild_replaces_rather_than_appends() {
        let dir = tempdir().unwrap();
        let mut pipeline = pipeline(dir.path().join("index.json"), CannedGenerator);

        let first = pipeline.build_index(&corpus()).await.unwrap();
        let second = pipeline.build_index(&corpus()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(pipeline.indexed_entries(), second);
    }

    #[tokio::test]
    async fn ensure_index_loads_a_prior_save() {
        let dir = tempdir().unwrap();
        let index_path = dir.path().join("index.json");

        let mut builder = pipeline(index_path.clone(), CannedGenerator);
        builder.build_index(&corpus()).await.unwrap();

        let mut config = pipeline_config(index_path);
        config.rebuild = false;
        let mut loader = QaPipeline::new(
            config,
            CharacterNgramEmbedder { dimensions: 128 },
            AnswerSynthesizer::new(CannedGenerator, GenerationOptions::default()),
        );

        let entry_count = loader.ensure_index(&[]).await.unwrap();
        assert_eq!(entry_count, builder.indexed_entries());
    }

    #[tokio::test]
    async fn ensure_index_rebuilds_when_no_save_exists() {
        let dir = tempdir().unwrap();
        let mut config = pipeline_config(dir.path().join("index.json"));
        config.rebuild = false;

        let mut pipeline = QaPipeline::new(
            config,
            CharacterNgramEmbedder { dimensions: 128 },
            AnswerSynthesizer::new(CannedGenerator, GenerationOptions::default()),
        );

        let entry_count = pipeline.ensure_index(&corpus()).await.unwrap();
        assert!(entry_count > 0);
    }

    #[tokio::test]
    async fn ensure_index_rebuilds_on_dimension_mismatch() {
        let dir = tempdir().unwrap();
        let index_path = dir.path().join("index.json");

        let mut small = QaPipeline::new(
            pipeline_config(index_path.clone()),
            CharacterNgramEmbedder { dimensions: 64 },
            AnswerSynthesizer::new(CannedGenerator, GenerationOptions::default()),
        );
        small.build_index(&corpus()).await.unwrap();

        let mut config = pipeline_config(index_path);
        config.rebuild = false;
        let mut wide = QaPipeline::new(
            config,
            CharacterNgramEmbedder { dimensions: 128 },
            AnswerSynthesizer::new(CannedGenerator, GenerationOptions::default()),
        );

        let entry_count = wide.ensure_index(&corpus()).await.unwrap();
        assert!(entry_count > 0);
        assert!(wide.is_ready());
    }

    #[tokio::test]
    async fn one_failed_question_does_not_abort_the_batch() {
        let dir = tempdir().unwrap();
        let mut pipeline = pipeline(dir.path().join("index.json"), SelectivelyFailingGenerator);
        pipeline.build_index(&corpus()).await.unwrap();

        let questions = vec![
            "poisoned question".to_string(),
            "payment terms".to_string(),
        ];
        let results = pipeline.ask_many(&questions).await;

        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(QueryError::Generation(_))));
        assert!(results[1].is_ok());
    }
}
