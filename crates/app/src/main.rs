mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use medrag_core::{
    extract_and_chunk_with, AnswerGenerator, AnswerMode, CharacterNgramEmbedder, ChunkingConfig,
    EmbeddingBackend, GeminiClient, GeminiConfig, HttpEmbedder, HttpEmbedderConfig,
    LopdfExtractor, RagPipeline, SharedEmbedder, VectorIndexStore, DEFAULT_CHUNK_OVERLAP,
    DEFAULT_CHUNK_SIZE, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_FASTEMBED_MODEL, DEFAULT_TOP_K,
};
#[cfg(feature = "semantic-search")]
use medrag_core::FastEmbedder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "medrag", version, about = "Grounded answers over a folder of medical PDFs")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the index manifest and vectors.
    #[arg(long, env = "MEDRAG_INDEX_DIR", default_value = "data/index", global = true)]
    index_dir: PathBuf,

    #[command(flatten)]
    embedding: EmbeddingArgs,
}

#[derive(Args, Clone)]
struct EmbeddingArgs {
    /// Embedding backend: `ngram` (built in), `http` (OpenAI-compatible endpoint)
    /// or `fastembed` (in-process model, `semantic-search` builds only).
    #[arg(long, env = "MEDRAG_EMBEDDER", default_value = "ngram", global = true)]
    embedder: EmbeddingBackend,

    /// Vector width produced by the embedder.
    #[arg(long, env = "MEDRAG_EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS, global = true)]
    embedding_dimensions: usize,

    /// Base URL of the embeddings endpoint (http backend).
    #[arg(long, env = "MEDRAG_EMBEDDING_URL", default_value = "http://localhost:11434/v1", global = true)]
    embedding_url: String,

    /// Embedding model name (http backend).
    #[arg(long, env = "MEDRAG_EMBEDDING_MODEL", default_value = "all-minilm", global = true)]
    embedding_model: String,

    /// Local model name (fastembed backend).
    #[arg(long, env = "MEDRAG_FASTEMBED_MODEL", default_value = DEFAULT_FASTEMBED_MODEL, global = true)]
    fastembed_model: String,

    /// Bearer token for the embeddings endpoint.
    #[arg(long, env = "MEDRAG_EMBEDDING_API_KEY", hide_env_values = true, global = true)]
    embedding_api_key: Option<String>,

    /// Texts sent per embeddings request.
    #[arg(long, env = "MEDRAG_EMBEDDING_BATCH", default_value_t = 32, global = true)]
    embedding_batch_size: usize,

    /// Seconds before an embeddings request times out.
    #[arg(long, env = "MEDRAG_EMBEDDING_TIMEOUT_SECS", default_value_t = 30, global = true)]
    embedding_timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk and embed every PDF in a folder, replacing the index.
    Ingest {
        /// Folder that contains the PDFs (not searched recursively).
        #[arg(long)]
        folder: PathBuf,
        /// Characters per chunk.
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
        /// Characters shared by consecutive chunks.
        #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
        chunk_overlap: usize,
    },
    /// Print the chunks closest to a query.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Answer a query from the indexed documents.
    Ask {
        #[arg(long)]
        query: String,
        /// `Doctor` or `Patient`.
        #[arg(long, default_value = "Doctor")]
        mode: AnswerMode,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Serve the HTTP API.
    Serve {
        #[arg(long, env = "MEDRAG_BIND", default_value = "127.0.0.1:8000")]
        bind: String,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
}

fn build_embedder(args: EmbeddingArgs) -> anyhow::Result<SharedEmbedder> {
    let embedder: SharedEmbedder = match args.embedder {
        EmbeddingBackend::Ngram => Arc::new(CharacterNgramEmbedder {
            dimensions: args.embedding_dimensions,
        }),
        EmbeddingBackend::Http => Arc::new(
            HttpEmbedder::new(HttpEmbedderConfig {
                base_url: args.embedding_url,
                model: args.embedding_model,
                api_key: args.embedding_api_key,
                dimensions: args.embedding_dimensions,
                batch_size: args.embedding_batch_size,
                timeout: Duration::from_secs(args.embedding_timeout_secs.max(1)),
            })
            .context("failed to set up the embeddings client")?,
        ),
        #[cfg(feature = "semantic-search")]
        EmbeddingBackend::FastEmbed => Arc::new(
            FastEmbedder::new(&args.fastembed_model)
                .with_context(|| format!("failed to load local model {}", args.fastembed_model))?,
        ),
        #[cfg(not(feature = "semantic-search"))]
        EmbeddingBackend::FastEmbed => anyhow::bail!(
            "the fastembed backend ({}) needs a build with --features semantic-search",
            args.fastembed_model
        ),
    };
    info!(model = %embedder.model_id(), dimensions = embedder.dimensions(), "embedder ready");
    Ok(embedder)
}

fn build_generator() -> AnswerGenerator {
    let Some(config) = GeminiConfig::from_env() else {
        warn!("GEMINI_API_KEY not set; answers will report that generation is not configured");
        return AnswerGenerator::unconfigured();
    };

    match GeminiClient::new(config) {
        Ok(client) => AnswerGenerator::new(Arc::new(client)),
        Err(error) => {
            warn!(%error, "could not set up the Gemini client");
            AnswerGenerator::unconfigured()
        }
    }
}

/// The store owns a blocking HTTP client when the http backend is used, so
/// it is created off the async executor.
async fn open_store(index_dir: PathBuf, args: EmbeddingArgs) -> anyhow::Result<Arc<VectorIndexStore>> {
    tokio::task::spawn_blocking(move || {
        let embedder = build_embedder(args)?;
        Ok(Arc::new(VectorIndexStore::new(index_dir, embedder)))
    })
    .await
    .context("embedder setup task panicked")?
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for ctrl-c");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        index_dir = %cli.index_dir.display(),
        "medrag boot"
    );

    let store = open_store(cli.index_dir.clone(), cli.embedding.clone()).await?;

    match cli.command {
        Command::Ingest {
            folder,
            chunk_size,
            chunk_overlap,
        } => {
            let config = ChunkingConfig::new(chunk_size, chunk_overlap)?;
            let build_store = Arc::clone(&store);
            let (report, summary) = tokio::task::spawn_blocking(move || {
                let report = extract_and_chunk_with(&folder, &LopdfExtractor, &config)?;
                let summary = build_store.build(&report.chunks)?;
                Ok::<_, anyhow::Error>((report, summary))
            })
            .await
            .context("ingest task panicked")??;

            for skipped in &report.skipped {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }
            for document in &report.documents {
                info!(
                    file = %document.file_name,
                    pages = document.pages_with_text,
                    chunks = document.chunk_count,
                    checksum = %document.checksum,
                    "indexed pdf"
                );
            }

            println!(
                "{} chunks from {} pdf(s) indexed with {} at {} ({} skipped)",
                summary.chunk_count,
                report.documents.len(),
                summary.model_id,
                Utc::now().to_rfc3339(),
                report.skipped.len()
            );
        }
        Command::Search { query, top_k } => {
            let search_store = Arc::clone(&store);
            let hits = tokio::task::spawn_blocking(move || search_store.search_scored(&query, top_k))
                .await
                .context("search task panicked")??;

            if hits.is_empty() {
                println!("no matching chunks");
            }
            for hit in hits {
                println!(
                    "distance={:.4} chunk={} source={} page={}",
                    hit.distance, hit.metadata.chunk_id, hit.metadata.source, hit.metadata.page
                );
                println!("  {}", hit.metadata.text.replace('\n', " "));
            }
        }
        Command::Ask { query, mode, top_k } => {
            let pipeline = RagPipeline::new(store, build_generator()).with_top_k(top_k);
            let answer = pipeline.answer(&query, mode).await?;

            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!("\nSources:\n{}", answer.sources);
            }
        }
        Command::Serve { bind, top_k } => {
            let pipeline = Arc::new(RagPipeline::new(store, build_generator()).with_top_k(top_k));
            let app = server::router(pipeline);

            let addr: SocketAddr = bind
                .parse()
                .with_context(|| format!("invalid bind address {bind}"))?;
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            info!(%addr, "medrag api listening");

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("server shutdown")?;
        }
    }

    Ok(())
}
