use crate::error::GenerationError;
use crate::models::RetrievedPassage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Caller-tunable generation knobs: low temperature for consistent
/// compliance answers, with a token budget roomy enough for structure.
#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 2000,
        }
    }
}

/// A generative model consumed as a single blocking request/response call.
#[async_trait]
pub trait Generator {
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint, as hosted
/// by Groq. The prompt arrives fully assembled, grounding instructions
/// included, so the client adds no wording of its own.
pub struct GroqGenerator {
    endpoint: String,
    model: String,
    api_key: String,
    client: Client,
}

impl GroqGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Generator for GroqGenerator {
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "user", "content": prompt },
                ],
                "temperature": options.temperature,
                "max_tokens": options.max_tokens,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenerationError::BackendResponse {
                backend: "groq".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        parsed
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(GenerationError::EmptyCompletion)
    }
}

const GROUNDING_INSTRUCTIONS: &str = "You are a legal compliance analyst reviewing contracts.\n\
Answer ONLY from the contract passages supplied below.\n\
If the answer is not in the passages, say \"I cannot find this information in the provided contracts.\"\n\
Cite the source label of every passage you rely on.";

/// The synthesized answer plus the distinct source labels of the passages
/// that were supplied to the model.
#[derive(Debug, Clone)]
pub struct SynthesizedAnswer {
    pub text: String,
    pub cited_sources: BTreeSet<String>,
}

/// Wraps a [`Generator`] with grounding-prompt assembly and source
/// attribution.
pub struct AnswerSynthesizer<G: Generator> {
    generator: G,
    options: GenerationOptions,
}

impl<G: Generator + Sync> AnswerSynthesizer<G> {
    pub fn new(generator: G, options: GenerationOptions) -> Self {
        Self { generator, options }
    }

    /// Asks the model to answer `question` from `passages` alone.
    ///
    /// `cited_sources` is derived from the passages actually supplied, not
    /// parsed out of the model's free text, so sources are always a subset
    /// of what was retrieved even when the model's own citations are
    /// malformed.
    pub async fn answer(
        &self,
        question: &str,
        passages: &[RetrievedPassage],
    ) -> Result<SynthesizedAnswer, GenerationError> {
        let prompt = build_prompt(question, passages);
        let text = self.generator.complete(&prompt, &self.options).await?;

        let cited_sources = passages
            .iter()
            .map(|passage| passage.source_label.clone())
            .collect();

        Ok(SynthesizedAnswer {
            text,
            cited_sources,
        })
    }
}

fn build_prompt(question: &str, passages: &[RetrievedPassage]) -> String {
    let mut prompt = format!(
        "{GROUNDING_INSTRUCTIONS}\n\nQuestion: {question}\n\nContext from contracts:\n"
    );

    if passages.is_empty() {
        prompt.push_str("(no passages were retrieved)\n");
        return prompt;
    }

    for passage in passages {
        prompt.push_str("\n[source: ");
        prompt.push_str(&passage.source_label);
        if let Some(page) = passage.metadata.get("page") {
            prompt.push_str(", page ");
            prompt.push_str(page);
        }
        if let Some(section) = &passage.section {
            prompt.push_str(", section ");
            prompt.push_str(section);
        }
        prompt.push_str("]\n");
        prompt.push_str(passage.text.trim());
        prompt.push('\n');
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct CannedGenerator {
        reply: String,
    }

    #[async_trait]
    impl Generator for CannedGenerator {
        async fn complete(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            Ok(self.reply.clone())
        }
    }

    struct CapturingGenerator {
        seen_prompt: std::sync::Mutex<String>,
    }

    #[async_trait]
    impl Generator for CapturingGenerator {
        async fn complete(
            &self,
            prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            *self.seen_prompt.lock().unwrap() = prompt.to_string();
            Ok("An answer.".to_string())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn complete(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, GenerationError> {
            Err(GenerationError::BackendResponse {
                backend: "groq".to_string(),
                details: "429 Too Many Requests".to_string(),
            })
        }
    }

    fn passage(source: &str, text: &str) -> RetrievedPassage {
        RetrievedPassage {
            text: text.to_string(),
            source_label: source.to_string(),
            section: None,
            metadata: BTreeMap::new(),
            score: 0.9,
        }
    }

    #[tokio::test]
    async fn cited_sources_come_from_supplied_passages() {
        let synthesizer = AnswerSynthesizer::new(
            CannedGenerator {
                reply: "The breach must be notified within 72 hours [made-up-source.txt].".to_string(),
            },
            GenerationOptions::default(),
        );

        let passages = vec![
            passage("dpa_compliant.txt", "breach notification within 72 hours"),
            passage("dpa_compliant.txt", "the controller shall be informed"),
            passage("msa.txt", "governing law is the state of Delaware"),
        ];

        let answer = synthesizer.answer("When must breaches be notified?", &passages).await.unwrap();

        // deduplicated, taken from the passages rather than the model text
        assert_eq!(answer.cited_sources.len(), 2);
        assert!(answer.cited_sources.contains("dpa_compliant.txt"));
        assert!(answer.cited_sources.contains("msa.txt"));
        assert!(!answer.cited_sources.contains("made-up-source.txt"));
    }

    #[tokio::test]
    async fn every_generator_receives_the_grounding_instructions() {
        let synthesizer = AnswerSynthesizer::new(
            CapturingGenerator {
                seen_prompt: std::sync::Mutex::new(String::new()),
            },
            GenerationOptions::default(),
        );

        let passages = vec![passage("nda.txt", "confidentiality survives termination")];
        synthesizer
            .answer("How long does confidentiality last?", &passages)
            .await
            .unwrap();

        let prompt = synthesizer.generator.seen_prompt.lock().unwrap().clone();
        assert!(prompt.contains("Answer ONLY from the contract passages"));
        assert!(prompt.contains("I cannot find this information in the provided contracts."));
        assert!(prompt.contains("Question: How long does confidentiality last?"));
        assert!(prompt.contains("[source: nda.txt]"));
    }

    #[tokio::test]
    async fn generation_failure_surfaces_as_error() {
        let synthesizer = AnswerSynthesizer::new(FailingGenerator, GenerationOptions::default());
        let result = synthesizer.answer("any question", &[]).await;
        assert!(matches!(result, Err(GenerationError::BackendResponse { .. })));
    }

    #[test]
    fn prompt_labels_every_passage_with_its_source() {
        let mut with_page = passage("employment.txt", "termination requires thirty days notice");
        with_page.metadata.insert("page".to_string(), "3".to_string());

        let prompt = build_prompt("What is the notice period?", &[with_page]);
        assert!(prompt.contains("Question: What is the notice period?"));
        assert!(prompt.contains("[source: employment.txt, page 3]"));
        assert!(prompt.contains("termination requires thirty days notice"));
    }

    #[test]
    fn empty_passage_list_still_produces_a_prompt() {
        let prompt = build_prompt("Anything?", &[]);
        assert!(prompt.contains("(no passages were retrieved)"));
    }
}
