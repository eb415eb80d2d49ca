//! Language model capability: prompt in, text out.

use async_trait::async_trait;

use crate::error::Result;

/// A text generation backend.
///
/// Implementations report failures as
/// [`RagError::GenerationError`](crate::RagError::GenerationError)
/// and perform no retries of their own.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, used in logs and errors.
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
