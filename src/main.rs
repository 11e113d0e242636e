//! # askdocs CLI
//!
//! The `askdocs` binary serves the HTTP API and provides companion commands
//! for one-off ingestion and querying from the shell.
//!
//! ```bash
//! askdocs --config ./askdocs.toml serve
//! askdocs ingest ./reports/audit-2026.pdf
//! askdocs query "What were the Q3 findings?"
//! ```
//!
//! All commands accept `--config` pointing to a TOML file; a missing file
//! falls back to defaults plus environment variables (`LLM_PROVIDER`,
//! `INDEX_URL`, `STORAGE_BUCKET`, ...).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use askdocs::config::load_config;
use askdocs::extract;
use askdocs::pipeline::{RagPipeline, DEFAULT_TOP_K};
use askdocs::server::run_server;
use askdocs::storage::ObjectStore;

/// askdocs — a retrieval-augmented document question-answering service.
#[derive(Parser)]
#[command(
    name = "askdocs",
    about = "A retrieval-augmented document question-answering service",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Missing file uses defaults plus
    /// environment variables.
    #[arg(long, global = true, default_value = "./askdocs.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve,

    /// Ingest a single document file into the vector index.
    Ingest {
        /// Path to a .pdf, .docx, or .txt file.
        file: PathBuf,
    },

    /// Ask a question against the indexed corpus.
    Query {
        /// The question text.
        question: String,

        /// Number of chunks to retrieve.
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            let pipeline = Arc::new(RagPipeline::from_config(&config).await?);
            let storage = match config.storage.clone() {
                Some(storage_config) => Some(Arc::new(ObjectStore::new(storage_config)?)),
                None => None,
            };
            run_server(&config, pipeline, storage).await
        }
        Commands::Ingest { file } => {
            let pipeline = RagPipeline::from_config(&config).await?;

            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .context("Invalid file name")?
                .to_string();
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let text = extract::extract_text(&bytes, &filename)?;
            let metadata = extract::file_metadata(&filename, bytes.len() as u64);
            let report = pipeline.ingest(&text, &metadata).await;

            println!("ingest {}", filename);
            println!("  chunks added: {}", report.added);
            if report.failed > 0 {
                println!("  chunks failed: {}", report.failed);
            }
            Ok(())
        }
        Commands::Query { question, top_k } => {
            let pipeline = RagPipeline::from_config(&config).await?;
            let answer = pipeline.answer(&question, top_k.max(1)).await;

            println!("{}", answer.answer);
            if let Some(sources) = answer.sources {
                println!();
                println!("sources: {}", sources.len());
                for (i, chunk) in sources.iter().enumerate() {
                    let preview: String = chunk.text.chars().take(80).collect();
                    println!("  [{}] {}", i + 1, preview);
                }
            }
            Ok(())
        }
    }
}
