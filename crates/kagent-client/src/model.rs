//! The opaque model-completion seam.

use async_trait::async_trait;

use kagent_common::ToolDefinition;

use crate::conversation::{ToolCallRequest, Turn};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("api error: {0}")]
    Api(String),

    #[error("rate limited")]
    RateLimited,

    #[error("network error: {0}")]
    Network(String),

    #[error("parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// What the model answered: final text, or a batch of tool calls to run
/// before asking again.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: TokenUsage,
}

/// `complete(messages, tools) → message | tool_calls`, treated as an opaque
/// blocking capability with its own deadline.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        turns: &[Turn],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, ModelError>;
}
