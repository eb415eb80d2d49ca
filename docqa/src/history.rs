//! Caller-owned conversation history.
//!
//! The query pipeline only reads a [`ConversationHistory`]; the caller appends
//! the user turn and the assistant turn after each answer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking questions.
    User,
    /// The language model's answers.
    Assistant,
}

impl Role {
    /// The label used when the turn is rendered into a prompt.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who spoke.
    pub role: Role,
    /// What was said.
    pub content: String,
    /// Zero-based position in the conversation, strictly increasing.
    pub position: usize,
}

/// An append-only, ordered log of conversation turns.
///
/// # Example
///
/// ```rust,ignore
/// let mut history = ConversationHistory::new();
/// let answer = pipeline.answer(&question, &history).await?;
/// history.push_user(question);
/// history.push_assistant(answer.text);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return its position.
    pub fn push(&mut self, role: Role, content: impl Into<String>) -> usize {
        let position = self.turns.len();
        self.turns.push(ConversationTurn { role, content: content.into(), position });
        position
    }

    /// Append a user turn.
    pub fn push_user(&mut self, content: impl Into<String>) -> usize {
        self.push(Role::User, content)
    }

    /// Append an assistant turn.
    pub fn push_assistant(&mut self, content: impl Into<String>) -> usize {
        self.push(Role::Assistant, content)
    }

    /// All turns in chronological order.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The last `n` turns in chronological order.
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    /// Number of turns recorded.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turn has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Forget every turn. Positions start again from zero.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Render turns as `"Role: content"` lines, each terminated by a newline.
pub fn format_history(turns: &[ConversationTurn]) -> String {
    turns.iter().map(|turn| format!("{}: {}\n", turn.role, turn.content)).collect()
}
