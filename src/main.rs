//! # docshelf CLI
//!
//! Commands for database initialization, document ingestion, and search.
//!
//! ## Usage
//!
//! ```bash
//! docshelf --config ./config/docshelf.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docshelf init` | Create the SQLite database and apply the schema |
//! | `docshelf ingest <path>` | Extract, chunk, embed, and store a document |
//! | `docshelf search "<query>"` | Search stored chunks (keyword or semantic) |
//!
//! `ingest` and `search --mode semantic` need `OPENAI_API_KEY` in the
//! environment (a `.env` file is honored). S3 sources additionally need
//! `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docshelf::chunker::ChunkEncoder;
use docshelf::config::{load_config, Config};
use docshelf::embedding::{DisabledEmbedder, OpenAiEmbedder};
use docshelf::extract::{FileExtractor, PageRange};
use docshelf::store::{SearchResult, SqliteStore};
use docshelf::{IngestionPipeline, RetrievalRouter};

/// docshelf — document ingestion and hybrid retrieval over a searchable
/// chunk store.
#[derive(Parser)]
#[command(
    name = "docshelf",
    about = "Document ingestion and hybrid retrieval over a searchable chunk store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docshelf.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, the chunks table, and the FTS5
    /// index. Idempotent.
    Init,

    /// Ingest a document.
    ///
    /// Accepts a local path or an `s3://bucket/key` URI. Supported
    /// formats: PDF, DOCX, Markdown, plain text.
    Ingest {
        /// Document path or S3 URI.
        path: String,

        /// PDF page range, 1-indexed inclusive (e.g. `2-10`).
        #[arg(long, value_parser = parse_page_range)]
        pages: Option<PageRange>,
    },

    /// Search stored chunks.
    Search {
        /// The search query string.
        query: String,

        /// Search mode: `keyword` (FTS5) or `semantic` (vector).
        #[arg(long, default_value = "keyword")]
        mode: String,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn parse_page_range(s: &str) -> Result<PageRange, String> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| format!("invalid page range '{s}', expected START-END"))?;
    let start: usize = start.trim().parse().map_err(|_| format!("invalid start page '{start}'"))?;
    let end: usize = end.trim().parse().map_err(|_| format!("invalid end page '{end}'"))?;
    PageRange::new(start, end).map_err(|e| e.to_string())
}

async fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    let store = SqliteStore::connect(&config.db.path, config.retry.policy())
        .await
        .context("failed to open document store")?;
    Ok(store)
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (i, result) in results.iter().enumerate() {
        let snippet: String = result.text.chars().take(160).collect();
        let snippet = snippet.replace('\n', " ");
        println!(
            "{:>2}. [{:.4}] {} (chunk {})",
            i + 1,
            result.score,
            result.metadata.source,
            result.metadata.chunk_index
        );
        println!("    {snippet}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    if config.embedding.model_ingest != config.embedding.model_query {
        tracing::warn!(
            ingest = %config.embedding.model_ingest,
            query = %config.embedding.model_query,
            "different ingest and query embedding models; ensure they share dimensions"
        );
    }

    match cli.command {
        Commands::Init => {
            let store = open_store(&config).await?;
            drop(store);
            println!("Database initialized at {}", config.db.path.display());
        }

        Commands::Ingest { path, pages } => {
            let store = open_store(&config).await?;
            let embedder = OpenAiEmbedder::new(&config.embedding, &config.retry)?;
            let encoder = ChunkEncoder::new(
                config.chunking.chunk_size_tokens,
                config.chunking.overlap_fraction,
            )?;
            let extractor = FileExtractor::new(config.retry.policy());

            let pipeline = IngestionPipeline::new(
                extractor,
                embedder,
                store,
                encoder,
                config.embedding.model_ingest.clone(),
            );
            let count = pipeline.ingest(&path, pages).await?;
            println!("Ingested {path}: {count} chunks stored.");
        }

        Commands::Search { query, mode, limit } => {
            let store = open_store(&config).await?;
            let results = match mode.as_str() {
                "keyword" => {
                    let router = RetrievalRouter::new(
                        DisabledEmbedder,
                        store,
                        config.embedding.model_query.clone(),
                        config.retrieval.clone(),
                    );
                    router.keyword_search(&query, limit).await?
                }
                "semantic" => {
                    let embedder = OpenAiEmbedder::new(&config.embedding, &config.retry)?;
                    let router = RetrievalRouter::new(
                        embedder,
                        store,
                        config.embedding.model_query.clone(),
                        config.retrieval.clone(),
                    );
                    router.semantic_search(&query, limit).await?
                }
                other => anyhow::bail!("unknown search mode '{other}' (use keyword or semantic)"),
            };
            print_results(&results);
        }
    }

    Ok(())
}
