//! # crowdintel
//!
//! Ask grounded questions about a crowdfunding campaign knowledge base.
//!
//! ## Commands
//!
//! - `crowdintel ingest` - rebuild the index from the corpus directory
//! - `crowdintel ask <QUESTION>` - answer a question from the indexed documents
//! - `crowdintel search <QUERY>` - show the nearest documents without generating
//! - `crowdintel rollback` - serve the previous index generation again
//! - `crowdintel status` - list index generations
//!
//! ## Examples
//!
//! ```bash
//! crowdintel ingest --corpus docs
//! crowdintel ask "What matters for design campaigns?" --top-k 3
//! crowdintel ask "How long should a campaign run?" --json
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` or pass `--verbose` for more detail.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crowdintel_rag::{
    AnswerSynthesizer, Credentials, EmbeddingEncoder, EmbeddingProvider, FileVectorStore,
    GeminiGenerator, HuggingFaceEmbeddingProvider, IngestionPipeline, OpenAIEmbeddingProvider,
    RagConfig, RetrievalEngine, VectorStore, ingest,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod render;

#[derive(Parser)]
#[command(name = "crowdintel")]
#[command(about = "Grounded question answering over crowdfunding campaign documents")]
#[command(version)]
struct Cli {
    /// Directory of *.txt corpus documents
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Directory holding the persisted index
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// Collection alias to publish and query
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Embedding backend
    #[arg(long, global = true, value_enum, default_value_t = EmbeddingBackend::Huggingface)]
    embedding: EmbeddingBackend,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EmbeddingBackend {
    Huggingface,
    Openai,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the index from the corpus directory
    Ingest {
        /// Print the ingestion report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from the indexed documents
    Ask {
        /// The question to answer
        question: String,

        /// Number of documents to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the answer as JSON
        #[arg(long)]
        json: bool,

        /// Also print the prompt sent to the generator
        #[arg(long)]
        show_prompt: bool,
    },

    /// Show the documents nearest to a query
    Search {
        /// The search query
        query: String,

        /// Number of documents to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print the results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Serve the previous index generation again
    Rollback,

    /// List index generations and the one currently served
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    debug!(?config, "configuration loaded");
    let credentials = Credentials::from_env();

    match cli.command {
        Command::Ingest { json } => {
            let store = open_store(&config).await?;
            let encoder = build_encoder(cli.embedding, &config, &credentials)?;
            let report = IngestionPipeline::from_config(&config, encoder, store)
                .rebuild()
                .await
                .with_context(|| format!("failed to ingest {}", config.corpus_dir.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                render::ingestion_report(&report);
            }
        }
        Command::Ask { question, json, show_prompt, .. } => {
            let api_key = credentials.require_gemini()?;
            let generator = GeminiGenerator::new(api_key)?
                .with_model(&config.generation_model)
                .with_timeout(config.request_timeout())?;
            let store = open_store(&config).await?;
            let encoder = build_encoder(cli.embedding, &config, &credentials)?;
            let engine = RetrievalEngine::new(encoder, store, &config.collection);
            let synthesizer = AnswerSynthesizer::from_config(&config, engine, Arc::new(generator))?;

            let mut answer = synthesizer
                .answer(&question, config.top_k)
                .await
                .context("failed to answer question")?;
            if !show_prompt {
                answer.prompt = None;
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                render::answer(&answer);
            }
        }
        Command::Search { query, json, .. } => {
            let store = open_store(&config).await?;
            let encoder = build_encoder(cli.embedding, &config, &credentials)?;
            let documents = RetrievalEngine::new(encoder, store, &config.collection)
                .retrieve(&query, config.top_k)
                .await
                .context("search failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&documents)?);
            } else {
                render::documents(&documents);
            }
        }
        Command::Rollback => {
            let store = open_store(&config).await?;
            let target = ingest::rollback(&*store, &config.collection).await?;
            println!("{} now serves {target}", config.collection);
        }
        Command::Status => {
            let store = open_store(&config).await?;
            let generations = ingest::generations(&*store, &config.collection).await?;
            let current = store.resolve(&config.collection).await.ok();
            render::status(&config.collection, current.as_deref(), &generations);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "crowdintel=debug,crowdintel_rag=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Defaults, then `CROWDINTEL_*` variables, then command-line flags.
fn load_config(cli: &Cli) -> Result<RagConfig> {
    let mut builder = RagConfig::from_env().context("invalid CROWDINTEL_* configuration")?.to_builder();
    if let Some(corpus) = &cli.corpus {
        builder = builder.corpus_dir(corpus);
    }
    if let Some(index_dir) = &cli.index_dir {
        builder = builder.index_dir(index_dir);
    }
    if let Some(collection) = &cli.collection {
        builder = builder.collection(collection);
    }
    if let Command::Ask { top_k: Some(k), .. } | Command::Search { top_k: Some(k), .. } =
        &cli.command
    {
        builder = builder.top_k(*k);
    }
    Ok(builder.build()?)
}

async fn open_store(config: &RagConfig) -> Result<Arc<FileVectorStore>> {
    let store = FileVectorStore::open(&config.index_dir)
        .await
        .with_context(|| format!("failed to open index at {}", config.index_dir.display()))?;
    Ok(Arc::new(store))
}

fn build_encoder(
    backend: EmbeddingBackend,
    config: &RagConfig,
    credentials: &Credentials,
) -> Result<EmbeddingEncoder> {
    let provider: Arc<dyn EmbeddingProvider> = match backend {
        EmbeddingBackend::Huggingface => {
            let mut provider =
                HuggingFaceEmbeddingProvider::new()?.with_timeout(config.request_timeout())?;
            if let Some(model) = &config.embedding_model {
                provider = provider.with_model(model);
            }
            if let Some(token) = &credentials.huggingface_token {
                provider = provider.with_token(token);
            }
            Arc::new(provider)
        }
        EmbeddingBackend::Openai => {
            let mut provider = OpenAIEmbeddingProvider::new(credentials.require_openai()?)?
                .with_timeout(config.request_timeout())?;
            if let Some(model) = &config.embedding_model {
                provider = provider.with_model(model);
            }
            Arc::new(provider)
        }
    };
    debug!(model = provider.model(), "embedding backend selected");
    Ok(EmbeddingEncoder::new(provider).with_retry(config.retry.clone()))
}
