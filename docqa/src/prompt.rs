//! Prompt assembly.
//!
//! The template is data; [`PromptTemplate::render`] is a pure function of a
//! [`PromptContext`].

use crate::document::SearchResult;
use crate::error::{RagError, Result};

/// The default prompt layout: previous conversation, retrieved context, then the question.
pub const DEFAULT_TEMPLATE: &str = "\
Previous conversation:
{chat_history}

Current context:
{context}

---

Given the conversation history above and the current context, answer this question: {question}
";

/// Separator placed between retrieved chunk texts.
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

const PLACEHOLDERS: [&str; 3] = ["{chat_history}", "{context}", "{question}"];

/// The values substituted into a prompt template for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptContext {
    /// Retrieved chunk texts joined with [`CONTEXT_DELIMITER`].
    pub context: String,
    /// Recent history formatted by [`format_history`](crate::history::format_history).
    pub history: String,
    /// The question as the user asked it.
    pub question: String,
}

/// A prompt template with `{chat_history}`, `{context}` and `{question}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { template: DEFAULT_TEMPLATE.to_string() }
    }
}

impl PromptTemplate {
    /// Create a template.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the template has no `{question}` placeholder.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains("{question}") {
            return Err(RagError::ConfigError(
                "prompt template must contain a {question} placeholder".to_string(),
            ));
        }
        Ok(Self { template })
    }

    /// The raw template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute `ctx` into the template.
    ///
    /// Placeholders are replaced in a single left-to-right pass, so braces
    /// inside substituted values are never expanded again.
    pub fn render(&self, ctx: &PromptContext) -> String {
        let mut out = String::with_capacity(
            self.template.len() + ctx.context.len() + ctx.history.len() + ctx.question.len(),
        );
        let mut rest = self.template.as_str();

        while let Some((at, placeholder)) = PLACEHOLDERS
            .iter()
            .filter_map(|p| rest.find(p).map(|at| (at, *p)))
            .min_by_key(|(at, _)| *at)
        {
            out.push_str(&rest[..at]);
            out.push_str(match placeholder {
                "{chat_history}" => &ctx.history,
                "{context}" => &ctx.context,
                _ => &ctx.question,
            });
            rest = &rest[at + placeholder.len()..];
        }
        out.push_str(rest);
        out
    }
}

/// Join retrieved texts in rank order.
pub fn build_context(results: &[SearchResult]) -> String {
    results.iter().map(|r| r.record.text.as_str()).collect::<Vec<_>>().join(CONTEXT_DELIMITER)
}
