//! Ollama embedding and generation backends.
//!
//! This module is only available when the `ollama` feature is enabled.

use async_trait::async_trait;
use ollama_rs::Ollama;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use tracing::{debug, error, info};

use crate::config::ModelConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::LanguageModel;

const DEFAULT_PORT: u16 = 11434;
const PROBE_TEXT: &str = "dimension probe";

/// Split `http://host:port` into the parts [`Ollama::new`] takes.
fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon) = url.rfind(':') {
        if let Ok(port) = url[colon + 1..].parse::<u16>() {
            return (url[..colon].to_string(), port);
        }
    }
    (url.to_string(), DEFAULT_PORT)
}

fn client(base_url: &str) -> Ollama {
    let (host, port) = parse_host_port(base_url);
    Ollama::new(host, port)
}

/// Embeddings from a local Ollama server.
///
/// The vector length is fixed at construction, either given explicitly or
/// probed from the server with [`OllamaEmbeddingProvider::detect`].
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingProvider {
    client: Ollama,
    model: String,
    dimensions: usize,
}

impl OllamaEmbeddingProvider {
    /// Create a provider for a model whose dimensionality is already known.
    pub fn new(base_url: &str, model: impl Into<String>, dimensions: usize) -> Self {
        Self { client: client(base_url), model: model.into(), dimensions }
    }

    /// Connect and learn the model's dimensionality by embedding a probe text.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if the server is unreachable or
    /// the model is not available.
    pub async fn detect(base_url: &str, model: impl Into<String>) -> Result<Self> {
        let mut provider = Self::new(base_url, model, 0);
        let probe = provider.request(vec![PROBE_TEXT.to_string()]).await?;
        provider.dimensions = probe.first().map(Vec::len).unwrap_or_default();
        if provider.dimensions == 0 {
            return Err(provider.error("model returned an empty embedding"));
        }
        info!(
            model = %provider.model,
            dimensions = provider.dimensions,
            "detected embedding model"
        );
        Ok(provider)
    }

    /// [`detect`](Self::detect) using the URL and embedding model of `models`.
    pub async fn from_config(models: &ModelConfig) -> Result<Self> {
        Self::detect(&models.base_url, models.embedding_model.clone()).await
    }

    fn error(&self, message: impl Into<String>) -> RagError {
        RagError::EmbeddingError {
            provider: format!("ollama/{}", self.model),
            message: message.into(),
        }
    }

    async fn request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let request =
            GenerateEmbeddingsRequest::new(self.model.clone(), EmbeddingsInput::Multiple(texts));
        let response = self.client.generate_embeddings(request).await.map_err(|e| {
            error!(model = %self.model, error = %e, "ollama embedding request failed");
            self.error(format!("request failed: {e}"))
        })?;
        Ok(response.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| self.error("server returned no embeddings"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, batch_size = texts.len(), "embedding batch");
        self.request(texts.iter().map(|t| (*t).to_string()).collect()).await
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Answer generation through the Ollama chat API.
#[derive(Debug, Clone)]
pub struct OllamaLanguageModel {
    client: Ollama,
    model: String,
}

impl OllamaLanguageModel {
    /// Create a client for `model` on the Ollama server at `base_url`.
    pub fn new(base_url: &str, model: impl Into<String>) -> Self {
        Self { client: client(base_url), model: model.into() }
    }

    /// Use the configured server and generation model.
    pub fn from_config(models: &ModelConfig) -> Self {
        Self::new(&models.base_url, models.generation_model.clone())
    }
}

#[async_trait]
impl LanguageModel for OllamaLanguageModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = ChatMessageRequest::new(
            self.model.clone(),
            vec![ChatMessage::user(prompt.to_string())],
        );
        let response = self.client.send_chat_messages(request).await.map_err(|e| {
            error!(model = %self.model, error = %e, "ollama chat request failed");
            RagError::GenerationError { model: self.model.clone(), message: e.to_string() }
        })?;
        Ok(response.message.content)
    }
}
