//! Conversation state: the ordered, append-only message log replayed to the
//! model on every turn.

use serde::{Deserialize, Serialize};

use kagent_common::{CallId, CallOutcome};

/// One tool invocation the model asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: CallId,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// One entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "turn", rename_all = "snake_case")]
pub enum Turn {
    /// The user's question.
    User { text: String },

    /// The model's final text for a round.
    Assistant { text: String },

    /// The model asked for tools; `text` is any commentary it produced
    /// alongside the batch.
    ToolCalls {
        text: String,
        calls: Vec<ToolCallRequest>,
    },

    /// Result of one call, tagged with the id that requested it.
    ToolResult {
        call_id: CallId,
        tool_name: String,
        outcome: CallOutcome,
    },
}

/// Monotonically appended message sequence. There is deliberately no API to
/// mutate or remove a recorded turn.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
