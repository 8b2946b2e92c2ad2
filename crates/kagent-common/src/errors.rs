use serde::{Deserialize, Serialize};

/// Errors raised while building the tool registry at startup.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid schema for tool {name}: {detail}")]
    InvalidSchema { name: String, detail: String },

    #[error("tool {0} does not declare read-only intent")]
    MutatingTool(String),
}

/// Classified failure from the cluster API.
///
/// `Transient` failures are retried inside the adapter; everything else is
/// returned immediately with the upstream detail preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum ClusterError {
    #[error("permission denied: {detail}")]
    PermissionDenied { detail: String },

    #[error("not found: {detail}")]
    NotFound { detail: String },

    #[error("transient: {detail}")]
    Transient { detail: String },

    #[error("upstream error (HTTP {code}): {detail}")]
    Upstream { code: u16, detail: String },
}

/// Failure of a single tool call.
///
/// Serialized into the result envelope so the model can reason about the
/// failure and adjust its next action; none of these terminate the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallError {
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("invalid arguments: {detail}")]
    InvalidArguments { detail: String },

    #[error("duplicate call: {call_id}")]
    DuplicateCall { call_id: String },

    #[error("cluster error: {cause}")]
    Cluster { cause: ClusterError },

    #[error("deadline exceeded after {budget_ms}ms")]
    DeadlineExceeded { budget_ms: u64 },

    #[error("cancelled")]
    Cancelled,
}

impl From<ClusterError> for CallError {
    fn from(cause: ClusterError) -> Self {
        CallError::Cluster { cause }
    }
}
