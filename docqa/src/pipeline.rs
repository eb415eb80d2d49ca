//! RAG pipeline facade.
//!
//! [`RagPipeline`] composes an [`Indexer`] and a [`QueryPipeline`] over one
//! shared [`EmbeddingProvider`] and [`VectorStore`], so indexing and querying
//! cannot drift onto different embedding models.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa::{ConversationHistory, RagConfig, RagPipeline, SqliteVectorStore};
//!
//! let config = RagConfig::load(Path::new("docqa.toml"))?;
//! let pipeline = RagPipeline::builder()
//!     .vector_store(Arc::new(SqliteVectorStore::open(&config.index_dir).await?))
//!     .config(config)
//!     .embedding_provider(Arc::new(my_embedder))
//!     .language_model(Arc::new(my_llm))
//!     .build()?;
//!
//! pipeline.reindex(Path::new("data")).await?;
//! let history = ConversationHistory::new();
//! let answer = pipeline.answer("What is the capital of France?", &history).await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::history::ConversationHistory;
use crate::indexer::{IndexReport, Indexer};
use crate::llm::LanguageModel;
use crate::loader::DirectoryLoader;
use crate::prompt::PromptTemplate;
use crate::query::{Answer, QueryPipeline};
use crate::vectorstore::VectorStore;

/// The indexing and query entry points over one index.
///
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    indexer: Indexer,
    query: QueryPipeline,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Index the files under `source_dir`. See [`Indexer::reindex`].
    pub async fn reindex(&self, source_dir: &Path) -> Result<IndexReport> {
        self.indexer.reindex(source_dir).await
    }

    /// Drop the whole index. See [`Indexer::reset`].
    pub async fn reset(&self) -> Result<()> {
        self.indexer.reset().await
    }

    /// Answer a question. See [`QueryPipeline::answer`].
    pub async fn answer(&self, question: &str, history: &ConversationHistory) -> Result<Answer> {
        self.query.answer(question, history).await
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `embedding_provider`, `vector_store` and `language_model` are required.
/// The config defaults to [`RagConfig::default()`], the chunker to a
/// [`RecursiveChunker`] sized from the config, and the template to
/// [`PromptTemplate::default()`].
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    language_model: Option<Arc<dyn LanguageModel>>,
    prompt_template: Option<PromptTemplate>,
    loader: Option<DirectoryLoader>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider used for both indexing and queries.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the language model that generates answers.
    pub fn language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    /// Set a custom prompt template.
    pub fn prompt_template(mut self, template: PromptTemplate) -> Self {
        self.prompt_template = Some(template);
        self
    }

    /// Set a custom directory loader.
    pub fn loader(mut self, loader: DirectoryLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Build the [`RagPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or the
    /// config fails validation.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let language_model = self
            .language_model
            .ok_or_else(|| RagError::ConfigError("language_model is required".to_string()))?;
        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap))
        });

        let mut indexer = Indexer::new(
            &config,
            chunker,
            Arc::clone(&embedding_provider),
            Arc::clone(&vector_store),
        );
        if let Some(loader) = self.loader {
            indexer = indexer.with_loader(loader);
        }

        let query = QueryPipeline::new(
            &config,
            Arc::clone(&embedding_provider),
            Arc::clone(&vector_store),
            language_model,
        )
        .with_template(self.prompt_template.unwrap_or_default());

        Ok(RagPipeline { config, embedding_provider, vector_store, indexer, query })
    }
}
