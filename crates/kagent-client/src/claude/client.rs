//! Claude API client: request building, response parsing, ModelClient impl.

use async_trait::async_trait;
use tracing::debug;

use kagent_common::{CallId, CallOutcome, ToolDefinition};

use crate::conversation::{ToolCallRequest, Turn};
use crate::model::{ModelClient, ModelError, ModelReply, TokenUsage};

use super::config::ClaudeConfig;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ClaudeClient {
    config: ClaudeConfig,
    http: reqwest::Client,
}

impl ClaudeClient {
    pub fn new(config: ClaudeConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::builder()
                .connect_timeout(std::time::Duration::from_secs(10))
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    /// Convert a catalog entry to the Claude tools format.
    fn to_claude_tool(tool: &ToolDefinition) -> serde_json::Value {
        serde_json::json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.parameters,
        })
    }

    /// Build the Messages API body. Tool results for one batch are grouped
    /// into a single user message, as the API requires them to directly
    /// follow the assistant's tool_use blocks.
    fn build_request_body(&self, turns: &[Turn], tools: &[ToolDefinition]) -> serde_json::Value {
        fn flush_results(
            messages: &mut Vec<serde_json::Value>,
            results: &mut Vec<serde_json::Value>,
        ) {
            if !results.is_empty() {
                messages.push(serde_json::json!({
                    "role": "user",
                    "content": std::mem::take(results),
                }));
            }
        }

        let mut messages: Vec<serde_json::Value> = Vec::new();
        let mut pending_results: Vec<serde_json::Value> = Vec::new();

        for turn in turns {
            match turn {
                Turn::User { text } => {
                    flush_results(&mut messages, &mut pending_results);
                    messages.push(serde_json::json!({
                        "role": "user",
                        "content": [{ "type": "text", "text": text }],
                    }));
                }
                Turn::Assistant { text } => {
                    flush_results(&mut messages, &mut pending_results);
                    messages.push(serde_json::json!({
                        "role": "assistant",
                        "content": [{ "type": "text", "text": text }],
                    }));
                }
                Turn::ToolCalls { text, calls } => {
                    flush_results(&mut messages, &mut pending_results);
                    let mut blocks = Vec::new();
                    if !text.is_empty() {
                        blocks.push(serde_json::json!({ "type": "text", "text": text }));
                    }
                    for call in calls {
                        blocks.push(serde_json::json!({
                            "type": "tool_use",
                            "id": call.call_id.as_str(),
                            "name": call.tool_name,
                            "input": call.arguments,
                        }));
                    }
                    messages.push(serde_json::json!({
                        "role": "assistant",
                        "content": blocks,
                    }));
                }
                Turn::ToolResult {
                    call_id, outcome, ..
                } => {
                    let (content, is_error) = match outcome {
                        CallOutcome::Ok { payload } => (payload.to_string(), false),
                        CallOutcome::Error { error } => (error.to_string(), true),
                    };
                    pending_results.push(serde_json::json!({
                        "type": "tool_result",
                        "tool_use_id": call_id.as_str(),
                        "content": content,
                        "is_error": is_error,
                    }));
                }
            }
        }
        flush_results(&mut messages, &mut pending_results);

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": messages,
        });

        if let Some(ref system) = self.config.system_prompt {
            body["system"] = serde_json::json!(system);
        }

        if !tools.is_empty() {
            let tool_defs: Vec<_> = tools.iter().map(Self::to_claude_tool).collect();
            body["tools"] = serde_json::json!(tool_defs);
        }

        body
    }

    fn parse_reply(&self, json: serde_json::Value) -> Result<ModelReply, ModelError> {
        let blocks = json["content"]
            .as_array()
            .ok_or_else(|| ModelError::Parse("response has no content array".into()))?;

        let content = blocks
            .iter()
            .filter(|b| b["type"] == "text")
            .filter_map(|b| b["text"].as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let tool_calls = blocks
            .iter()
            .filter(|b| b["type"] == "tool_use")
            .map(|b| ToolCallRequest {
                call_id: CallId::from(b["id"].as_str().unwrap_or_default()),
                tool_name: b["name"].as_str().unwrap_or_default().to_string(),
                arguments: b["input"].clone(),
            })
            .collect();

        let usage = TokenUsage {
            input_tokens: json["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens: json["usage"]["output_tokens"].as_u64().unwrap_or(0),
        };

        Ok(ModelReply {
            content,
            tool_calls,
            usage,
        })
    }
}

#[async_trait]
impl ModelClient for ClaudeClient {
    async fn complete(
        &self,
        turns: &[Turn],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, ModelError> {
        let body = self.build_request_body(turns, tools);

        debug!(model = %self.config.model, turns = turns.len(), "Claude API request");

        let response = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ModelError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text = text.chars().take(200).collect::<String>();
            return Err(ModelError::Api(format!("HTTP {status}: {text}")));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;

        self.parse_reply(json)
    }
}
