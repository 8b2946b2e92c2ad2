//! Wire protocol between the diagnostic client and the tool server.
//!
//! Both directions carry versioned, self-describing JSON envelopes so the
//! client and server can evolve independently. Commands flow client → server,
//! events flow server → client; each direction is FIFO on its own, with no
//! ordering guarantee between the two beyond causality.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CallError;
use crate::id::{CallId, SessionId};

/// Bumped on any incompatible envelope change; checked during the hello
/// handshake.
pub const PROTOCOL_VERSION: u8 = 1;

/// A tool the server advertises to clients (and, through them, to the model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool's arguments.
    pub parameters: serde_json::Value,
}

/// Client → server messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// First message on a new connection.
    Hello { version: u8 },

    /// Request one tool execution. `call_id` must be fresh for the session.
    Call {
        call_id: CallId,
        tool_name: String,
        arguments: serde_json::Value,
        issued_at: DateTime<Utc>,
    },

    /// Orderly session shutdown.
    Close,
}

/// Server → client messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Handshake reply; carries the tool catalog in stable order.
    SessionReady {
        session_id: SessionId,
        version: u8,
        catalog: Vec<ToolDefinition>,
    },

    /// Outcome of one call. Results arrive in completion order, which may
    /// differ from request order; clients correlate by `call_id`.
    Result {
        call_id: CallId,
        outcome: CallOutcome,
        completed_at: DateTime<Utc>,
    },

    /// Session is closing.
    Closed { reason: String },

    /// The peer sent something the server could not interpret; the session
    /// is closed after this.
    ProtocolError { message: String },
}

/// Success-or-failure payload of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallOutcome {
    Ok { payload: serde_json::Value },
    Error { error: CallError },
}

impl CallOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, CallOutcome::Ok { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_command_wire_shape() {
        let cmd = Command::Call {
            call_id: CallId::from("c-1"),
            tool_name: "list_pods".into(),
            arguments: serde_json::json!({"namespace": "default"}),
            issued_at: Utc::now(),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "call");
        assert_eq!(json["tool_name"], "list_pods");
        assert_eq!(json["arguments"]["namespace"], "default");
    }

    #[test]
    fn hello_roundtrip() {
        let json = r#"{"type":"hello","version":1}"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, Command::Hello { version: 1 }));
    }

    #[test]
    fn result_event_carries_error_outcome() {
        let event = Event::Result {
            call_id: CallId::from("c-2"),
            outcome: CallOutcome::Error {
                error: CallError::UnknownTool {
                    name: "nope".into(),
                },
            },
            completed_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "result");
        assert_eq!(json["outcome"]["status"], "error");
        assert_eq!(json["outcome"]["error"]["kind"], "unknown_tool");
    }

    #[test]
    fn malformed_command_rejected() {
        let err = serde_json::from_str::<Command>(r#"{"type":"launch_missiles"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn outcome_ok_predicate() {
        let ok = CallOutcome::Ok {
            payload: serde_json::json!([]),
        };
        assert!(ok.is_ok());
        let failed = CallOutcome::Error {
            error: CallError::Cancelled,
        };
        assert!(!failed.is_ok());
    }
}
