//! Client-side orchestration for kagent.
//!
//! Drives the agent conversation: sends the user query plus the server's
//! tool catalog to the model, dispatches the model's tool-call batches over
//! the transport, feeds results back, and repeats until the model produces
//! a final answer.

pub mod agent;
pub mod claude;
pub mod conversation;
pub mod model;
pub mod transport;

pub use agent::DebugAgent;
pub use claude::{ClaudeClient, ClaudeConfig};
pub use conversation::{Conversation, ToolCallRequest, Turn};
pub use model::{ModelClient, ModelError, ModelReply, TokenUsage};
pub use transport::{ToolTransport, WsTransport};

/// Failures that terminate the orchestration loop's `run` call. Tool-level
/// failures never show up here; they go back to the model as failed results.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("max turns exceeded after {turns} rounds")]
    MaxTurnsExceeded {
        turns: u32,
        /// The partial conversation, preserved for display.
        trace: Vec<Turn>,
    },

    #[error("transport closed")]
    TransportClosed,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}
