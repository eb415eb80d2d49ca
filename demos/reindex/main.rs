//! # Reindex
//!
//! Indexes a directory of text, markdown, and PDF files into the on-disk
//! SQLite store, embedding with a local Ollama server. Re-running only
//! embeds chunks that are new or changed.
//!
//! Run: `cargo run --example reindex -- data --reset`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use docqa::{
    OllamaEmbeddingProvider, OllamaLanguageModel, RagConfig, RagPipeline, SqliteVectorStore,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Build or update the document index")]
struct Args {
    /// Directory of source documents.
    #[arg(default_value = "data")]
    source_dir: PathBuf,
    /// Configuration file (TOML). Defaults apply when it does not exist.
    #[arg(long, default_value = "docqa.toml")]
    config: PathBuf,
    /// Clear the index before indexing.
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = RagConfig::load(&args.config)?;

    let store = SqliteVectorStore::open(&config.index_dir)
        .await
        .with_context(|| format!("opening index at {}", config.index_dir.display()))?;
    let embedder = OllamaEmbeddingProvider::from_config(&config.models)
        .await
        .context("is the Ollama server running and the embedding model pulled?")?;

    let pipeline = RagPipeline::builder()
        .language_model(Arc::new(OllamaLanguageModel::from_config(&config.models)))
        .embedding_provider(Arc::new(embedder))
        .vector_store(Arc::new(store))
        .config(config)
        .build()?;

    if args.reset {
        println!("Clearing index");
        pipeline.reset().await?;
    }

    let report = pipeline.reindex(&args.source_dir).await?;
    println!(
        "{} documents, {} chunks: {} added, {} updated, {} unchanged",
        report.documents, report.total, report.added, report.updated, report.skipped
    );
    for failed in &report.failed_documents {
        println!("  skipped unreadable file {failed}");
    }
    Ok(())
}
