//! # Chat
//!
//! A terminal conversation over an index built by the `reindex` example.
//! The loop owns the conversation history and appends both turns after
//! each answer; the pipeline only reads it.
//!
//! Run: `cargo run --example chat`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use docqa::{
    ConversationHistory, OllamaEmbeddingProvider, OllamaLanguageModel, RagConfig, RagPipeline,
    SqliteVectorStore,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Ask questions about the indexed documents")]
struct Args {
    /// Configuration file (TOML). Defaults apply when it does not exist.
    #[arg(long, default_value = "docqa.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
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

    let mut history = ConversationHistory::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        match question {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                history.clear();
                continue;
            }
            _ => {}
        }

        match pipeline.answer(question, &history).await {
            Ok(answer) => {
                println!("{}\n", answer.text);
                if !answer.sources.is_empty() {
                    println!("Sources:");
                    for source in &answer.sources {
                        println!("  {source}");
                    }
                    println!();
                }
                history.push_user(question);
                history.push_assistant(answer.text);
            }
            Err(e) => eprintln!("error: {e}\n"),
        }
    }
    Ok(())
}
