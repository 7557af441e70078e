use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use contract_qa_core::{
    load_corpus, AnswerSynthesizer, CharacterNgramEmbedder, Embedder, GenerationOptions,
    GroqGenerator, HttpEmbedder, JsonlReportWriter, PipelineConfig, QaPipeline,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "contract-qa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path of the persisted vector index.
    #[arg(long, default_value = "qa_index.json")]
    index_path: PathBuf,

    /// Chunk size in characters.
    #[arg(long, default_value = "800")]
    chunk_chars: usize,

    /// Chunk overlap in characters.
    #[arg(long, default_value = "120")]
    overlap_chars: usize,

    /// Batch size for embedding requests.
    #[arg(long, default_value = "32")]
    embed_batch_size: usize,

    /// Use the deterministic local embedder instead of a hosted one.
    #[arg(long, default_value_t = false)]
    local_embedder: bool,

    /// Base URL of an OpenAI-compatible embeddings endpoint.
    #[arg(long, default_value = "http://localhost:8080/v1")]
    embedding_url: String,

    /// Embedding model name.
    #[arg(long, default_value = "sentence-transformers/all-MiniLM-L6-v2")]
    embedding_model: String,

    /// Vector dimensionality of the embedding model.
    #[arg(long, default_value = "384")]
    embedding_dimensions: usize,

    /// API key for the embeddings endpoint, if it requires one.
    #[arg(long, env = "EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,

    /// Base URL of the Groq-compatible chat completions endpoint.
    #[arg(long, default_value = "https://api.groq.com/openai/v1")]
    groq_url: String,

    /// Generation model name.
    #[arg(long, default_value = "llama-3.3-70b-versatile")]
    groq_model: String,

    /// Groq API key.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    groq_api_key: Option<String>,

    /// Sampling temperature for answer generation.
    #[arg(long, default_value = "0.2")]
    temperature: f32,

    /// Token budget for answer generation.
    #[arg(long, default_value = "2000")]
    max_tokens: u32,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk and embed a contract folder into the vector index.
    Build {
        /// Folder containing contract files (.txt, .md), searched recursively.
        #[arg(long)]
        contracts: PathBuf,
    },
    /// Answer questions about an indexed contract folder.
    Ask {
        /// Folder containing contract files, used when a rebuild is needed.
        #[arg(long)]
        contracts: PathBuf,

        /// Question to answer. Repeat for a batch.
        #[arg(long = "query", required = true)]
        queries: Vec<String>,

        /// Number of passages to retrieve per question.
        #[arg(long, default_value = "4")]
        top_k: usize,

        /// Rebuild the index before answering instead of loading the saved one.
        #[arg(long, default_value_t = false)]
        rebuild: bool,

        /// Append results to this JSONL file.
        #[arg(long)]
        results: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "contract-qa boot"
    );

    if cli.local_embedder {
        let embedder = CharacterNgramEmbedder {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        };
        run(&cli, embedder).await
    } else {
        let embedder = HttpEmbedder::new(
            &cli.embedding_url,
            &cli.embedding_model,
            cli.embedding_api_key.clone(),
            cli.embedding_dimensions,
        );
        run(&cli, embedder).await
    }
}

async fn run<E: Embedder + Sync>(cli: &Cli, embedder: E) -> anyhow::Result<()> {
    let generator = GroqGenerator::new(
        &cli.groq_url,
        &cli.groq_model,
        cli.groq_api_key.clone().unwrap_or_default(),
    );
    let synthesizer = AnswerSynthesizer::new(
        generator,
        GenerationOptions {
            temperature: cli.temperature,
            max_tokens: cli.max_tokens,
        },
    );

    match &cli.command {
        Command::Build { contracts } => {
            let config = PipelineConfig {
                chunk_chars: cli.chunk_chars,
                overlap_chars: cli.overlap_chars,
                top_k: 4,
                embed_batch_size: cli.embed_batch_size,
                index_path: cli.index_path.clone(),
                rebuild: true,
            };
            let mut pipeline = QaPipeline::new(config, embedder, synthesizer);

            let report = load_corpus(contracts)
                .with_context(|| format!("loading contracts from {}", contracts.display()))?;
            report_skipped(&report.skipped_files);

            let entry_count = pipeline.build_index(&report.documents).await?;
            println!(
                "{} chunks indexed from {} contracts at {}",
                entry_count,
                report.documents.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Ask {
            contracts,
            queries,
            top_k,
            rebuild,
            results,
        } => {
            if cli.groq_api_key.is_none() {
                anyhow::bail!("GROQ_API_KEY is not set; answers cannot be generated");
            }

            let config = PipelineConfig {
                chunk_chars: cli.chunk_chars,
                overlap_chars: cli.overlap_chars,
                top_k: *top_k,
                embed_batch_size: cli.embed_batch_size,
                index_path: cli.index_path.clone(),
                rebuild: *rebuild,
            };
            let mut pipeline = QaPipeline::new(config, embedder, synthesizer);

            let report = load_corpus(contracts)
                .with_context(|| format!("loading contracts from {}", contracts.display()))?;
            report_skipped(&report.skipped_files);

            let entry_count = pipeline.ensure_index(&report.documents).await?;
            info!(entry_count, "index ready");

            let writer = results.as_ref().map(JsonlReportWriter::new);
            let outcomes = pipeline.ask_many(queries).await;

            let mut failures = 0usize;
            for (question, outcome) in queries.iter().zip(outcomes) {
                println!("question: {question}");
                match outcome {
                    Ok(result) => {
                        println!("answer:\n{}", result.answer);
                        for source in &result.sources {
                            println!("  source: {source}");
                        }
                        if let Some(writer) = &writer {
                            writer.append(&result)?;
                        }
                    }
                    Err(error) => {
                        failures += 1;
                        println!("error: {error}");
                    }
                }
                println!();
            }

            if failures > 0 {
                warn!(failures, total = queries.len(), "some questions failed");
            }
        }
    }

    Ok(())
}

fn report_skipped(skipped: &[contract_qa_core::SkippedFile]) {
    for file in skipped {
        warn!(path = %file.path.display(), reason = %file.reason, "skipped contract file");
    }
}
