use async_trait::async_trait;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use docqa_core::{
    AutoExtractor, Capabilities, CharacterNgramEmbedder, Embedder, EngineConfig, EngineError,
    GroundedGenerator, HttpEmbedder, HttpGenerator, HttpProviderConfig, QaEngine, SourceDocument,
    UnconstrainedGenerator, DEFAULT_EMBEDDING_DIMENSIONS,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(flatten)]
    providers: ProviderArgs,
}

#[derive(Args)]
struct EngineArgs {
    /// Index artifact for the single document slot
    #[arg(long, env = "DOCQA_INDEX_PATH", default_value = "index/document.index.json")]
    index_path: PathBuf,

    /// Characters per chunk
    #[arg(long, env = "DOCQA_CHUNK_SIZE", default_value = "1000")]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, env = "DOCQA_CHUNK_OVERLAP", default_value = "200")]
    chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, env = "DOCQA_TOP_K", default_value = "4")]
    top_k: usize,

    /// Chunks shorter than this after whitespace normalisation are never retrieved
    #[arg(long, env = "DOCQA_MIN_CHUNK_CHARS", default_value = "5")]
    min_chunk_chars: usize,

    /// Seconds before an embedding or generation call is abandoned
    #[arg(long, env = "DOCQA_TIMEOUT_SECS", default_value = "60")]
    timeout_secs: u64,
}

#[derive(Args)]
struct ProviderArgs {
    /// Embedding endpoint; the local trigram embedder is used when absent
    #[arg(long, env = "DOCQA_EMBEDDING_URL")]
    embedding_url: Option<String>,

    /// Embedding model name sent to the endpoint
    #[arg(long, env = "DOCQA_EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// Width of the vectors the embedder returns
    #[arg(long, env = "DOCQA_EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Text generation endpoint used for grounded and fallback answers
    #[arg(long, env = "DOCQA_GENERATION_URL")]
    generation_url: Option<String>,

    /// Generation model name sent to the endpoint
    #[arg(long, env = "DOCQA_GENERATION_MODEL")]
    generation_model: Option<String>,

    /// Generation temperature
    #[arg(long, env = "DOCQA_TEMPERATURE", default_value = "0.3")]
    temperature: f32,

    /// Bearer token for both endpoints
    #[arg(long, env = "DOCQA_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Index a document, replacing whatever the slot held before.
    Ingest {
        /// PDF or UTF-8 text file.
        #[arg(long)]
        file: PathBuf,
    },
    /// Answer a question from the indexed document.
    Ask {
        /// Question text
        #[arg(long)]
        question: String,
        /// Allow an answer from general knowledge when the document has none.
        #[arg(long, default_value_t = false)]
        permission: bool,
    },
    /// Report whether an index is available.
    Health,
}

/// Stands in for both generators when no endpoint is configured.
struct NoGenerationEndpoint;

#[async_trait]
impl GroundedGenerator for NoGenerationEndpoint {
    async fn generate_grounded(
        &self,
        _context: &str,
        _question: &str,
    ) -> Result<String, EngineError> {
        Err(EngineError::Generation("no generation endpoint configured".to_string()))
    }
}

#[async_trait]
impl UnconstrainedGenerator for NoGenerationEndpoint {
    async fn generate_unconstrained(&self, _question: &str) -> Result<String, EngineError> {
        Err(EngineError::Generation("no generation endpoint configured".to_string()))
    }
}

impl EngineArgs {
    fn to_config(&self) -> EngineConfig {
        EngineConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            top_k: self.top_k,
            min_chunk_chars: self.min_chunk_chars,
            index_path: self.index_path.clone(),
            capability_timeout_secs: self.timeout_secs,
        }
    }
}

impl ProviderArgs {
    fn endpoint(&self, url: &str, model: &Option<String>, timeout: Duration) -> HttpProviderConfig {
        HttpProviderConfig {
            endpoint: url.to_string(),
            api_key: self.api_key.clone(),
            model: model.clone(),
            temperature: self.temperature,
            timeout,
        }
    }

    fn capabilities(&self, timeout: Duration) -> anyhow::Result<Capabilities> {
        let embedder: Arc<dyn Embedder> = match &self.embedding_url {
            Some(url) => Arc::new(HttpEmbedder::new(
                &self.endpoint(url, &self.embedding_model, timeout),
                self.embedding_dimensions,
            )?),
            None => Arc::new(CharacterNgramEmbedder::new(self.embedding_dimensions)),
        };

        let capabilities = match &self.generation_url {
            Some(url) => {
                let generator = Arc::new(HttpGenerator::new(&self.endpoint(
                    url,
                    &self.generation_model,
                    timeout,
                ))?);
                Capabilities {
                    extractor: Arc::new(AutoExtractor::default()),
                    embedder,
                    grounded: generator.clone(),
                    unconstrained: generator,
                }
            }
            None => Capabilities {
                extractor: Arc::new(AutoExtractor::default()),
                embedder,
                grounded: Arc::new(NoGenerationEndpoint),
                unconstrained: Arc::new(NoGenerationEndpoint),
            },
        };

        Ok(capabilities)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.engine.to_config();
    let capabilities = cli.providers.capabilities(config.capability_timeout())?;

    if cli.providers.generation_url.is_none() {
        warn!("no generation endpoint configured; questions can only be denied or fail");
    }

    let engine = QaEngine::new(config, capabilities)?;
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        index_path = %engine.config().index_path.display(),
        "docqa boot"
    );

    match cli.command {
        Command::Ingest { file } => {
            let bytes = tokio::fs::read(&file).await?;
            let handle = engine.ingest(SourceDocument::new(source_name(&file), bytes)).await?;

            println!(
                "{} chunks ingested from {} into {} at {}",
                handle.chunk_count,
                handle.document.source_name,
                handle.path.display(),
                handle.document.ingested_at.to_rfc3339()
            );
        }
        Command::Ask {
            question,
            permission,
        } => {
            let outcome = engine.answer(&question, permission).await?;
            println!("state: {:?}", outcome.state);
            println!("answer: {}", outcome.answer);
        }
        Command::Health => {
            let health = engine.health().await;
            println!("ready: {}", health.ready);
            if let (Some(document_id), Some(chunk_count)) =
                (health.document_id, health.chunk_count)
            {
                println!("document_id: {document_id}");
                println!("chunk_count: {chunk_count}");
            }
        }
    }

    Ok(())
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
