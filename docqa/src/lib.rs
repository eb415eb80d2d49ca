//! Local document question answering.
//!
//! This crate provides:
//! - Document loading from a corpus directory (text, markdown, and PDF with the `pdf` feature)
//! - Deterministic chunking with stable chunk ids and content hashes
//! - Incremental indexing that only re-embeds new or changed chunks
//! - In-memory and SQLite vector stores with cosine-distance search
//! - Prompt assembly from retrieved context and caller-owned conversation history
//! - Ollama (`ollama` feature) and OpenAI (`openai` feature) model backends
//!
//! The entry point is [`RagPipeline`], which exposes `reindex` and `answer`.

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod history;
pub mod indexer;
pub mod inmemory;
pub mod llm;
pub mod loader;
pub mod pipeline;
pub mod prompt;
pub mod query;
pub mod sqlite;
pub mod vectorstore;

#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker, chunk_id, content_hash};
pub use config::{ModelConfig, RagConfig, RagConfigBuilder};
pub use document::{Chunk, Document, RecordMetadata, SearchResult, VectorRecord};
pub use embedding::{EmbeddingDescriptor, EmbeddingProvider};
pub use error::{RagError, Result};
pub use history::{ConversationHistory, ConversationTurn, Role, format_history};
pub use indexer::{IndexReport, Indexer};
pub use inmemory::InMemoryVectorStore;
pub use llm::LanguageModel;
#[cfg(feature = "pdf")]
pub use loader::PdfLoader;
pub use loader::{DirectoryLoad, DirectoryLoader, DocumentLoader, TextLoader};
#[cfg(feature = "ollama")]
pub use ollama::{OllamaEmbeddingProvider, OllamaLanguageModel};
#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
pub use pipeline::{RagPipeline, RagPipelineBuilder};
pub use prompt::{DEFAULT_TEMPLATE, PromptContext, PromptTemplate, build_context};
pub use query::{Answer, QueryPipeline, parse_answer};
pub use sqlite::SqliteVectorStore;
pub use vectorstore::{VectorStore, WriteLease, cosine_distance};
