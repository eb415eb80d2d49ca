//! Question answering over the index.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::history::{ConversationHistory, format_history};
use crate::llm::LanguageModel;
use crate::prompt::{PromptContext, PromptTemplate, build_context};
use crate::vectorstore::VectorStore;

/// The result of answering one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// The user-facing answer text.
    pub text: String,
    /// Chunk ids of the retrieved records, in rank order.
    pub sources: Vec<String>,
}

/// Extract the user-facing answer from raw model output.
///
/// Everything from the first `"\nSources:"` on is dropped, as is a leading
/// `"Response:"` label.
pub fn parse_answer(raw: &str) -> String {
    let body = raw.split_once("\nSources:").map_or(raw, |(before, _)| before);
    let body = body.trim();
    body.strip_prefix("Response:").unwrap_or(body).trim().to_string()
}

/// Embed → retrieve → assemble prompt → generate → parse.
///
/// The pipeline never modifies the history it is given.
pub struct QueryPipeline {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    language_model: Arc<dyn LanguageModel>,
    template: PromptTemplate,
    top_k: usize,
    history_turns: usize,
    generation_timeout: Option<Duration>,
}

impl QueryPipeline {
    /// Create a pipeline using `config`'s `top_k`, `history_turns` and
    /// generation timeout, with the [`DEFAULT_TEMPLATE`](crate::DEFAULT_TEMPLATE).
    pub fn new(
        config: &RagConfig,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        language_model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            embedding_provider,
            vector_store,
            language_model,
            template: PromptTemplate::default(),
            top_k: config.top_k,
            history_turns: config.history_turns,
            generation_timeout: (config.generation_timeout_secs > 0)
                .then(|| Duration::from_secs(config.generation_timeout_secs)),
        }
    }

    /// Replace the prompt template.
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Build the prompt for `question` without invoking the language model.
    ///
    /// Returns the prompt and the retrieved chunk ids.
    pub async fn prepare(
        &self,
        question: &str,
        history: &ConversationHistory,
    ) -> Result<(String, Vec<String>)> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::RetrievalError("question is empty".to_string()));
        }

        let configured = self.embedding_provider.descriptor();
        let stored = self.vector_store.descriptor().await.map_err(|e| {
            error!(error = %e, "failed to read stored embedding descriptor");
            e.during("descriptor lookup")
        })?;
        if let Some(stored) = stored {
            if stored != configured {
                error!(%stored, %configured, "query embedding model does not match the index");
                return Err(RagError::EmbeddingMismatch { stored, configured });
            }
        }

        let query_embedding = self.embedding_provider.embed(question).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e.during("query embedding")
        })?;

        let results =
            self.vector_store.similarity_search(&query_embedding, self.top_k).await.map_err(
                |e| {
                    error!(error = %e, "vector store search failed");
                    e.during("similarity search")
                },
            )?;
        debug!(result_count = results.len(), "retrieved context");

        let prompt = self.template.render(&PromptContext {
            context: build_context(&results),
            history: format_history(history.recent(self.history_turns)),
            question: question.to_string(),
        });
        let sources = results.into_iter().map(|r| r.record.id).collect();
        Ok((prompt, sources))
    }

    /// Answer `question` in the context of `history`.
    ///
    /// An empty index still reaches the language model, with empty context.
    ///
    /// # Errors
    ///
    /// - [`RagError::RetrievalError`] for an empty question.
    /// - [`RagError::EmbeddingMismatch`] if the index was built with another model.
    /// - [`RagError::PipelineError`] wrapping the embedding, search, or
    ///   generation failure, including a generation timeout.
    pub async fn answer(&self, question: &str, history: &ConversationHistory) -> Result<Answer> {
        let (prompt, sources) = self.prepare(question, history).await?;

        let raw = self.generate(&prompt).await.map_err(|e| {
            error!(model = self.language_model.name(), error = %e, "generation failed");
            e.during("generation")
        })?;

        let text = parse_answer(&raw);
        info!(source_count = sources.len(), answer_len = text.len(), "query answered");
        Ok(Answer { text, sources })
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let Some(limit) = self.generation_timeout else {
            return self.language_model.generate(prompt).await;
        };
        tokio::time::timeout(limit, self.language_model.generate(prompt)).await.map_err(|_| {
            RagError::GenerationError {
                model: self.language_model.name().to_string(),
                message: format!("timed out after {}s", limit.as_secs()),
            }
        })?
    }
}
