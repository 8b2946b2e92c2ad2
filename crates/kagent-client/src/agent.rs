//! The orchestration loop: where model non-determinism meets protocol
//! determinism.
//!
//! Every round either ends the run (final text) or dispatches the model's
//! whole tool-call batch and waits for every result before asking again, so
//! the model always sees a complete picture of what it requested.

use futures_util::future::join_all;
use tracing::debug;

use crate::conversation::{Conversation, Turn};
use crate::model::{ModelClient, TokenUsage};
use crate::transport::ToolTransport;
use crate::AgentError;

pub struct DebugAgent<M, T> {
    model: M,
    transport: T,
    max_turns: u32,
    conversation: Conversation,
    usage: TokenUsage,
}

impl<M: ModelClient, T: ToolTransport> DebugAgent<M, T> {
    pub fn new(model: M, transport: T) -> Self {
        Self {
            model,
            transport,
            max_turns: 10,
            conversation: Conversation::new(),
            usage: TokenUsage::default(),
        }
    }

    /// Bound on model rounds per `run`; guarantees termination even if the
    /// model keeps requesting tools forever.
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// The conversation so far (kept across `run` calls, so follow-up
    /// questions have context).
    pub fn conversation(&self) -> &[Turn] {
        self.conversation.turns()
    }

    pub fn usage(&self) -> &TokenUsage {
        &self.usage
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Answer one user query, running as many tool rounds as the model
    /// needs, up to `max_turns`.
    pub async fn run(&mut self, query: impl Into<String>) -> Result<String, AgentError> {
        self.conversation.push(Turn::User { text: query.into() });

        for round in 0..self.max_turns {
            let reply = self
                .model
                .complete(self.conversation.turns(), self.transport.catalog())
                .await?;
            self.usage.add(&reply.usage);

            if reply.tool_calls.is_empty() {
                // Final text: the loop's only normal terminal state.
                self.conversation.push(Turn::Assistant {
                    text: reply.content.clone(),
                });
                return Ok(reply.content);
            }

            debug!(round, calls = reply.tool_calls.len(), "Dispatching tool batch");
            self.conversation.push(Turn::ToolCalls {
                text: reply.content,
                calls: reply.tool_calls.clone(),
            });

            // Barrier: dispatch the whole batch concurrently and wait for
            // every result. Completion order does not matter; each result
            // is appended tagged with the call id that requested it.
            let outcomes = join_all(
                reply
                    .tool_calls
                    .iter()
                    .map(|call| self.transport.call(call.clone())),
            )
            .await;

            for (call, outcome) in reply.tool_calls.iter().zip(outcomes) {
                let outcome = outcome?;
                self.conversation.push(Turn::ToolResult {
                    call_id: call.call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    outcome,
                });
            }
        }

        Err(AgentError::MaxTurnsExceeded {
            turns: self.max_turns,
            trace: self.conversation.turns().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use kagent_common::{CallError, CallId, CallOutcome, ClusterError, ToolDefinition};

    use crate::conversation::ToolCallRequest;
    use crate::model::{ModelError, ModelReply};

    /// Scripted model: pops one canned reply per completion call and records
    /// how many tool results were visible each time it was asked.
    struct ScriptedModel {
        replies: Mutex<Vec<ModelReply>>,
        calls: AtomicU32,
        results_seen: Mutex<Vec<usize>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<ModelReply>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicU32::new(0),
                results_seen: Mutex::new(Vec::new()),
            }
        }

        fn completions(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelClient for &ScriptedModel {
        async fn complete(
            &self,
            turns: &[Turn],
            _tools: &[ToolDefinition],
        ) -> Result<ModelReply, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results_seen.lock().unwrap().push(
                turns
                    .iter()
                    .filter(|t| matches!(t, Turn::ToolResult { .. }))
                    .count(),
            );
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                // A model that never stops asking for tools.
                return Ok(tool_reply(vec![call(
                    &format!("loop-{}", self.completions()),
                    "list_pods",
                )]));
            }
            Ok(replies.remove(0))
        }
    }

    /// Transport stub: maps tool name → outcome.
    struct StubTransport {
        catalog: Vec<ToolDefinition>,
        outcomes: HashMap<String, CallOutcome>,
        fail_transport: bool,
    }

    impl StubTransport {
        fn new() -> Self {
            Self {
                catalog: vec![definition("list_pods"), definition("list_events")],
                outcomes: HashMap::new(),
                fail_transport: false,
            }
        }

        fn with_outcome(mut self, tool: &str, outcome: CallOutcome) -> Self {
            self.outcomes.insert(tool.to_string(), outcome);
            self
        }
    }

    #[async_trait]
    impl ToolTransport for StubTransport {
        fn catalog(&self) -> &[ToolDefinition] {
            &self.catalog
        }

        async fn call(&self, request: ToolCallRequest) -> Result<CallOutcome, AgentError> {
            if self.fail_transport {
                return Err(AgentError::TransportClosed);
            }
            Ok(self
                .outcomes
                .get(&request.tool_name)
                .cloned()
                .unwrap_or(CallOutcome::Ok {
                    payload: serde_json::json!({}),
                }))
        }
    }

    fn definition(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: "test".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    fn call(id: &str, tool: &str) -> ToolCallRequest {
        ToolCallRequest {
            call_id: CallId::from(id),
            tool_name: tool.to_string(),
            arguments: serde_json::json!({}),
        }
    }

    fn text_reply(text: &str) -> ModelReply {
        ModelReply {
            content: text.to_string(),
            tool_calls: Vec::new(),
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
        }
    }

    fn tool_reply(calls: Vec<ToolCallRequest>) -> ModelReply {
        ModelReply {
            content: String::new(),
            tool_calls: calls,
            usage: TokenUsage::default(),
        }
    }

    #[tokio::test]
    async fn immediate_final_answer() {
        let model = ScriptedModel::new(vec![text_reply("all pods are healthy")]);
        let mut agent = DebugAgent::new(&model, StubTransport::new());

        let answer = agent.run("how are my pods?").await.unwrap();
        assert_eq!(answer, "all pods are healthy");
        assert_eq!(model.completions(), 1);
        assert!(matches!(agent.conversation()[0], Turn::User { .. }));
        assert!(matches!(agent.conversation()[1], Turn::Assistant { .. }));
    }

    #[tokio::test]
    async fn unhealthy_pods_scenario() {
        let model = ScriptedModel::new(vec![
            tool_reply(vec![ToolCallRequest {
                call_id: CallId::from("toolu_1"),
                tool_name: "list_pods".into(),
                arguments: serde_json::json!({
                    "namespace": "default",
                    "status_filter": "unhealthy"
                }),
            }]),
            text_reply("One unhealthy pod: nginx-7f (CrashLoopBackOff)."),
        ]);
        let transport = StubTransport::new().with_outcome(
            "list_pods",
            CallOutcome::Ok {
                payload: serde_json::json!([
                    {"name": "nginx-7f", "phase": "CrashLoopBackOff"}
                ]),
            },
        );
        let mut agent = DebugAgent::new(&model, transport);

        let answer = agent
            .run("Show unhealthy pods in namespace default")
            .await
            .unwrap();
        assert_eq!(answer, "One unhealthy pod: nginx-7f (CrashLoopBackOff).");

        // The result was appended tagged with its call id before the second
        // model round.
        let result_turn = agent
            .conversation()
            .iter()
            .find(|t| matches!(t, Turn::ToolResult { .. }))
            .unwrap();
        match result_turn {
            Turn::ToolResult { call_id, outcome, .. } => {
                assert_eq!(call_id.as_str(), "toolu_1");
                assert!(outcome.is_ok());
            }
            _ => unreachable!(),
        }
        assert_eq!(model.results_seen.lock().unwrap().as_slice(), &[0, 1]);
    }

    #[tokio::test]
    async fn partial_batch_failure_does_not_fail_run() {
        let model = ScriptedModel::new(vec![
            tool_reply(vec![
                call("toolu_a", "list_pods"),
                call("toolu_b", "list_events"),
            ]),
            text_reply("pods listed; events were not accessible"),
        ]);
        let transport = StubTransport::new()
            .with_outcome(
                "list_pods",
                CallOutcome::Ok {
                    payload: serde_json::json!({"items": []}),
                },
            )
            .with_outcome(
                "list_events",
                CallOutcome::Error {
                    error: CallError::Cluster {
                        cause: ClusterError::PermissionDenied {
                            detail: "events is forbidden".into(),
                        },
                    },
                },
            );
        let mut agent = DebugAgent::new(&model, transport);

        let answer = agent.run("check pods and events").await.unwrap();
        assert_eq!(answer, "pods listed; events were not accessible");

        // Both results recorded: one ok, one failed.
        let outcomes: Vec<bool> = agent
            .conversation()
            .iter()
            .filter_map(|t| match t {
                Turn::ToolResult { outcome, .. } => Some(outcome.is_ok()),
                _ => None,
            })
            .collect();
        assert_eq!(outcomes, [true, false]);

        // The barrier held: the second completion saw both results at once.
        assert_eq!(model.results_seen.lock().unwrap().as_slice(), &[0, 2]);
    }

    #[tokio::test]
    async fn max_turns_exceeded_at_exact_boundary() {
        // Empty script → the model asks for tools forever.
        let model = ScriptedModel::new(Vec::new());
        let mut agent = DebugAgent::new(&model, StubTransport::new()).with_max_turns(4);

        let err = agent.run("diagnose").await.unwrap_err();
        match err {
            AgentError::MaxTurnsExceeded { turns, trace } => {
                assert_eq!(turns, 4);
                assert!(!trace.is_empty());
            }
            other => panic!("expected MaxTurnsExceeded, got {other:?}"),
        }
        // Exactly max_turns completions: not one fewer, not one more.
        assert_eq!(model.completions(), 4);
    }

    #[tokio::test]
    async fn transport_loss_terminates_run() {
        let model = ScriptedModel::new(vec![tool_reply(vec![call("toolu_x", "list_pods")])]);
        let mut transport = StubTransport::new();
        transport.fail_transport = true;
        let mut agent = DebugAgent::new(&model, transport);

        let err = agent.run("anything").await.unwrap_err();
        assert!(matches!(err, AgentError::TransportClosed));
    }
}
