//! Embedding provider trait for generating vector embeddings from text.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Identity of an embedding space: the model name and its output dimensionality.
///
/// The descriptor is persisted next to the vector store on the first write.
/// Indexing runs and queries whose provider reports a different descriptor
/// are rejected, since vectors from different models are not comparable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EmbeddingDescriptor {
    /// Model identifier, including any version tag (e.g. `nomic-embed-text:v1.5`).
    pub model: String,
    /// Length of every vector produced by the model.
    pub dimensions: usize,
}

impl EmbeddingDescriptor {
    /// Create a descriptor.
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self { model: model.into(), dimensions }
    }
}

impl fmt::Display for EmbeddingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} dims)", self.model, self.dimensions)
    }
}

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (Ollama, OpenAI, etc.)
/// behind a unified async interface. The same provider must be used for
/// indexing and querying an index. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it.
///
/// # Example
///
/// ```rust,ignore
/// use docqa::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in input order.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input. Override this method if the backend
    /// supports native batch embedding for better throughput.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the model identifier.
    fn model(&self) -> &str;

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Return the descriptor of the embedding space this provider produces.
    fn descriptor(&self) -> EmbeddingDescriptor {
        EmbeddingDescriptor::new(self.model(), self.dimensions())
    }
}

/// Check that a provider returned one vector of the expected length per input.
pub(crate) fn check_embeddings(
    descriptor: &EmbeddingDescriptor,
    expected_count: usize,
    vectors: &[Vec<f32>],
) -> Result<()> {
    if vectors.len() != expected_count {
        return Err(RagError::EmbeddingError {
            provider: descriptor.model.clone(),
            message: format!("expected {expected_count} embeddings, got {}", vectors.len()),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != descriptor.dimensions) {
        return Err(RagError::EmbeddingError {
            provider: descriptor.model.clone(),
            message: format!(
                "expected {} dimensions, got a vector of length {}",
                descriptor.dimensions,
                bad.len()
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Constant;

    #[async_trait]
    impl EmbeddingProvider for Constant {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        fn model(&self) -> &str {
            "constant"
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn default_batch_preserves_order() {
        let vectors = Constant.embed_batch(&["a", "abc", "ab"]).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0, 1.0], vec![3.0, 1.0], vec![2.0, 1.0]]);
    }

    #[test]
    fn descriptor_reflects_model_and_dimensions() {
        assert_eq!(Constant.descriptor(), EmbeddingDescriptor::new("constant", 2));
        assert_eq!(Constant.descriptor().to_string(), "constant (2 dims)");
    }

    #[test]
    fn check_embeddings_rejects_wrong_shapes() {
        let descriptor = EmbeddingDescriptor::new("m", 2);
        assert!(check_embeddings(&descriptor, 1, &[vec![0.0, 1.0]]).is_ok());
        assert!(check_embeddings(&descriptor, 2, &[vec![0.0, 1.0]]).is_err());
        assert!(check_embeddings(&descriptor, 1, &[vec![0.0]]).is_err());
    }
}
