//! Session manager: owns one connection's worth of in-flight tool calls.
//!
//! Each call gets its own execution task; results are pushed onto the
//! session's event channel in the order they complete, which may differ from
//! request order. Sessions are independent — closing one cancels only its
//! own executions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kagent_cluster::ClusterAdapter;
use kagent_common::{CallError, CallId, CallOutcome, Event, SessionId, ToolDefinition};
use kagent_tools::ToolRegistry;

/// Per-call execution state. Transitions are one-way; no call revisits
/// `Issued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Issued,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl CallState {
    fn is_terminal(self) -> bool {
        matches!(self, CallState::Completed | CallState::Failed | CallState::Cancelled)
    }
}

/// Shared, immutable-after-startup context for opening sessions.
pub struct SessionManager {
    registry: Arc<ToolRegistry>,
    adapter: Arc<ClusterAdapter>,
    call_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        registry: Arc<ToolRegistry>,
        adapter: Arc<ClusterAdapter>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            adapter,
            call_timeout,
        }
    }

    pub fn catalog(&self) -> Vec<ToolDefinition> {
        self.registry.catalog()
    }

    /// Open a session whose results flow to `event_tx`.
    pub fn open(&self, event_tx: mpsc::Sender<Event>) -> Session {
        let session = Session {
            inner: Arc::new(SessionInner {
                id: SessionId::new(),
                registry: Arc::clone(&self.registry),
                adapter: Arc::clone(&self.adapter),
                call_timeout: self.call_timeout,
                event_tx,
                calls: Mutex::new(HashMap::new()),
                cancel: CancellationToken::new(),
            }),
        };
        info!(session = %session.id(), "Session opened");
        session
    }
}

struct SessionInner {
    id: SessionId,
    registry: Arc<ToolRegistry>,
    adapter: Arc<ClusterAdapter>,
    call_timeout: Duration,
    event_tx: mpsc::Sender<Event>,
    /// Every call id the session has ever seen, with its current state.
    /// Ids are never removed, which is what enforces no-reuse.
    calls: Mutex<HashMap<CallId, CallState>>,
    cancel: CancellationToken,
}

impl SessionInner {
    async fn push_result(&self, call_id: CallId, outcome: CallOutcome) {
        // The receiver disappears when the transport drops; nothing to do
        // about it here.
        let _ = self
            .event_tx
            .send(Event::Result {
                call_id,
                outcome,
                completed_at: Utc::now(),
            })
            .await;
    }

    /// Move a call to a terminal state, unless it already reached one.
    async fn settle(&self, call_id: &CallId, next: CallState) {
        let mut calls = self.calls.lock().await;
        if let Some(state) = calls.get_mut(call_id) {
            if !state.is_terminal() {
                *state = next;
            }
        }
    }
}

/// One client connection's worth of in-flight call state.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    /// Handle one tool-call request.
    ///
    /// A reused call id — in flight or already settled — is a protocol
    /// violation and fails with `DuplicateCall`; it never touches the
    /// original call's execution. Unknown tools fail the call without
    /// starting an execution. Both terminate only the offending call.
    pub async fn dispatch(&self, call_id: CallId, tool_name: String, arguments: serde_json::Value) {
        if self.inner.cancel.is_cancelled() {
            return;
        }

        {
            let mut calls = self.inner.calls.lock().await;
            if calls.contains_key(&call_id) {
                warn!(session = %self.inner.id, call = %call_id, "Reused call id");
                drop(calls);
                self.inner
                    .push_result(
                        call_id.clone(),
                        CallOutcome::Error {
                            error: CallError::DuplicateCall {
                                call_id: call_id.to_string(),
                            },
                        },
                    )
                    .await;
                return;
            }
            calls.insert(call_id.clone(), CallState::Issued);
        }

        if self.inner.registry.lookup(&tool_name).is_err() {
            warn!(session = %self.inner.id, tool = %tool_name, "Unknown tool requested");
            self.inner.settle(&call_id, CallState::Failed).await;
            self.inner
                .push_result(
                    call_id,
                    CallOutcome::Error {
                        error: CallError::UnknownTool { name: tool_name },
                    },
                )
                .await;
            return;
        }

        self.inner
            .calls
            .lock()
            .await
            .insert(call_id.clone(), CallState::Executing);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            debug!(session = %inner.id, call = %call_id, tool = %tool_name, "Executing call");
            let result = tokio::select! {
                _ = inner.cancel.cancelled() => None,
                result = run_call(&inner, &tool_name, arguments) => Some(result),
            };

            match result {
                None => {
                    inner.settle(&call_id, CallState::Cancelled).await;
                    debug!(session = %inner.id, call = %call_id, "Call cancelled");
                }
                Some(Ok(payload)) => {
                    inner.settle(&call_id, CallState::Completed).await;
                    inner
                        .push_result(call_id, CallOutcome::Ok { payload })
                        .await;
                }
                Some(Err(error)) => {
                    inner.settle(&call_id, CallState::Failed).await;
                    inner
                        .push_result(call_id, CallOutcome::Error { error })
                        .await;
                }
            }
        });
    }

    /// Cancel all in-flight executions and release the session. Idempotent.
    pub async fn close(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.cancel.cancel();

        let mut calls = self.inner.calls.lock().await;
        for state in calls.values_mut() {
            if !state.is_terminal() {
                *state = CallState::Cancelled;
            }
        }
        info!(session = %self.inner.id, calls = calls.len(), "Session closed");
    }

    /// Current state of a call, if the session has seen its id.
    pub async fn call_state(&self, call_id: &CallId) -> Option<CallState> {
        self.inner.calls.lock().await.get(call_id).copied()
    }
}

async fn run_call(
    inner: &SessionInner,
    tool_name: &str,
    arguments: serde_json::Value,
) -> Result<serde_json::Value, CallError> {
    let tool = inner
        .registry
        .lookup(tool_name)
        .map_err(|_| CallError::UnknownTool {
            name: tool_name.to_string(),
        })?;
    inner
        .adapter
        .execute(tool, arguments, inner.call_timeout)
        .await
}
