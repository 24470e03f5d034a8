//! Anthropic Messages API provider implementation.
//!
//! # Role mapping
//! - `system`: lifted into the top-level `system` field; several system
//!   messages are joined with a blank line
//! - `user`, `assistant`: sent as-is; assistant tool calls become
//!   `tool_use` blocks
//! - `tool`: sent as `user` carrying a `tool_result` block
//!
//! Consecutive messages that land on the same role are merged, as the
//! Messages API requires alternating turns.
//!
//! # Sampling
//! `temperature` is clamped to 0.0..=1.0, the range the Messages API
//! accepts; OpenAI-style values above 1.0 are sent as 1.0.

use crate::sse::{malformed_payload, open_event_source, send_checked, with_deadline, SseStream};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use gateway_core::normalizer::build_response;
use gateway_core::streaming::{forward_stream, FunctionCallDelta, ToolCallDelta};
use gateway_core::{
    ChatOutcome, ChatRequest, Credential, DeltaStream, FinishReason, GatewayError, Message,
    ProviderAdapter, ProviderConfig, ProviderFamily, ProviderResult, Role, StreamDelta, ToolCall,
    ToolType, UpstreamRole,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Default Anthropic API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic API version header value
pub const API_VERSION: &str = "2023-06-01";

/// `max_tokens` sent when the request does not set one (required upstream)
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Upper bound of the Messages API `temperature`
const MAX_TEMPERATURE: f32 = 1.0;

const FAMILY: ProviderFamily = ProviderFamily::Anthropic;

/// Anthropic provider adapter
#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    client: Client,
    deadline: Option<Duration>,
}

impl AnthropicAdapter {
    /// Create an adapter on a shared HTTP client
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            deadline: None,
        }
    }

    /// Bound non-streaming calls by a total deadline
    #[must_use]
    pub fn with_timeout(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn messages_url(config: &ProviderConfig) -> String {
        let base = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/v1/messages")
    }

    fn transform_request(&self, config: &ProviderConfig, request: &ChatRequest) -> AnthropicRequest {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut messages: Vec<AnthropicMessage> = Vec::new();

        for message in &request.messages {
            let role = match self.map_role(message.role) {
                UpstreamRole::Lifted(_) => {
                    if !message.text().is_empty() {
                        system_parts.push(message.text());
                    }
                    continue;
                }
                UpstreamRole::Native(role) | UpstreamRole::Degraded(role) => role,
            };

            let blocks = content_blocks(message);
            if blocks.is_empty() {
                continue;
            }

            match messages.last_mut() {
                Some(last) if last.role == role => last.content.extend(blocks),
                _ => messages.push(AnthropicMessage {
                    role,
                    content: blocks,
                }),
            }
        }

        let tools = request.tools.as_ref().filter(|t| !t.is_empty()).map(|tools| {
            tools
                .iter()
                .map(|tool| AnthropicTool {
                    name: tool.function.name.clone(),
                    description: tool.function.description.clone(),
                    input_schema: tool
                        .function
                        .parameters
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
                })
                .collect()
        });

        AnthropicRequest {
            model: config.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
            messages,
            temperature: request.temperature.map(|t| t.clamp(0.0, MAX_TEMPERATURE)),
            top_p: request.top_p,
            tools,
            stream: request.stream,
        }
    }
}

fn content_blocks(message: &Message) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();

    if message.role == Role::Tool {
        match &message.tool_call_id {
            Some(id) => blocks.push(ContentBlock::ToolResult {
                tool_use_id: id.clone(),
                content: message.text().to_string(),
            }),
            None => blocks.push(ContentBlock::Text {
                text: format!("Tool result: {}", message.text()),
            }),
        }
        return blocks;
    }

    if !message.text().is_empty() {
        blocks.push(ContentBlock::Text {
            text: message.text().to_string(),
        });
    }

    if message.role == Role::Assistant {
        for call in message.tool_calls.iter().flatten() {
            let input = serde_json::from_str(&call.function.arguments)
                .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
            blocks.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.function.name.clone(),
                input,
            });
        }
    }

    blocks
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn family(&self) -> ProviderFamily {
        FAMILY
    }

    fn map_role(&self, role: Role) -> UpstreamRole {
        match role {
            Role::System => UpstreamRole::Lifted("system"),
            Role::User => UpstreamRole::Native("user"),
            Role::Assistant => UpstreamRole::Native("assistant"),
            Role::Tool => UpstreamRole::Degraded("user"),
        }
    }

    async fn chat(
        &self,
        config: &ProviderConfig,
        credential: &Credential,
        request: &ChatRequest,
    ) -> ProviderResult {
        let url = Self::messages_url(config);
        let body = self.transform_request(config, request);

        debug!(provider = %FAMILY, model = %config.model, stream = request.stream, "Sending request to Anthropic");

        let builder = self
            .client
            .post(&url)
            .header("x-api-key", credential.expose())
            .header("anthropic-version", API_VERSION)
            .json(&body);
        let builder = with_deadline(builder, self.deadline, request.stream);

        if request.stream {
            let events = open_event_source(FAMILY, builder).await?;
            return Ok(ChatOutcome::Stream(forward_stream(
                stream_deltas(events),
                config.model.clone(),
                request.has_tools(),
            )));
        }

        let response: AnthropicResponse = send_checked(FAMILY, builder)
            .await?
            .json()
            .await
            .map_err(|e| malformed_payload(FAMILY, e))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ResponseBlock::Text { text: part } => text.push_str(&part),
                ResponseBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::function(id, name, input.to_string()));
                }
                ResponseBlock::Other => {}
            }
        }

        Ok(ChatOutcome::Completion(build_response(
            Some(text),
            &config.model,
            Some(tool_calls),
            response.stop_reason.as_deref().and_then(map_stop_reason),
        )))
    }
}

fn map_stop_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "end_turn" | "stop_sequence" => Some(FinishReason::Stop),
        "max_tokens" => Some(FinishReason::Length),
        "tool_use" => Some(FinishReason::ToolCalls),
        _ => None,
    }
}

fn stream_deltas(mut events: SseStream) -> DeltaStream {
    let stream = try_stream! {
        // content block index -> tool call position
        let mut tool_blocks: HashMap<u32, u32> = HashMap::new();

        while let Some(event) = events.next().await {
            let event = event?;
            let parsed = match serde_json::from_str::<StreamEvent>(&event.data) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(provider = %FAMILY, event = %event.event, error = %e, "Skipping unparsable event");
                    continue;
                }
            };

            match parsed {
                StreamEvent::ContentBlockStart {
                    index,
                    content_block: StartBlock::ToolUse { id, name },
                } => {
                    let position = tool_blocks.len() as u32;
                    tool_blocks.insert(index, position);
                    yield StreamDelta::ToolCalls(vec![ToolCallDelta {
                        index: position,
                        id: Some(id),
                        tool_type: Some(ToolType::Function),
                        function: FunctionCallDelta {
                            name: Some(name),
                            arguments: Some(String::new()),
                        },
                    }]);
                }
                StreamEvent::ContentBlockDelta {
                    delta: BlockDelta::TextDelta { text },
                    ..
                } if !text.is_empty() => {
                    yield StreamDelta::Text(text);
                }
                StreamEvent::ContentBlockDelta {
                    index,
                    delta: BlockDelta::InputJsonDelta { partial_json },
                } if !partial_json.is_empty() => {
                    if let Some(&position) = tool_blocks.get(&index) {
                        yield StreamDelta::ToolCalls(vec![ToolCallDelta {
                            index: position,
                            id: None,
                            tool_type: None,
                            function: FunctionCallDelta {
                                name: None,
                                arguments: Some(partial_json),
                            },
                        }]);
                    }
                }
                StreamEvent::MessageStop => break,
                StreamEvent::Error { error } => {
                    Err(GatewayError::streaming(format!(
                        "anthropic stream error: {}",
                        error.message
                    )))?;
                }
                _ => {}
            }
        }
    };

    Box::pin(stream)
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockStart {
        index: u32,
        content_block: StartBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    MessageStop,
    Error {
        error: StreamErrorDetail,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StartBlock {
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::Tool;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> ProviderConfig {
        ProviderConfig::new(
            FAMILY,
            "claude-3-5-sonnet-latest",
            vec![Credential::new("sk-ant")],
        )
        .unwrap()
        .with_base_url(server.uri())
    }

    #[test]
    fn test_temperature_is_clamped_to_messages_range() {
        let adapter = AnthropicAdapter::new(Client::new());
        let config = ProviderConfig::new(FAMILY, "claude", vec![Credential::new("k")]).unwrap();
        let body = |temperature: f32| {
            let request = ChatRequest::builder()
                .message(Message::user("hi"))
                .temperature(temperature)
                .build()
                .unwrap();
            serde_json::to_value(adapter.transform_request(&config, &request)).unwrap()
        };

        assert_eq!(body(1.5)["temperature"], 1.0);
        assert_eq!(body(2.0)["temperature"], 1.0);
        assert_eq!(body(0.5)["temperature"], 0.5);

        let request = ChatRequest::builder().message(Message::user("hi")).build().unwrap();
        let unset = serde_json::to_value(adapter.transform_request(&config, &request)).unwrap();
        assert!(unset.get("temperature").is_none());
    }

    #[test]
    fn test_transform_lifts_system_and_merges_tool_results() {
        let adapter = AnthropicAdapter::new(Client::new());
        let config = ProviderConfig::new(FAMILY, "claude", vec![Credential::new("k")]).unwrap();
        let request = ChatRequest::builder()
            .message(Message::system("Be brief."))
            .message(Message::system("Answer in French."))
            .message(Message::user("weather?"))
            .message(Message::assistant_tool_calls(vec![
                ToolCall::function("toolu_1", "get_weather", r#"{"location":"Paris"}"#),
                ToolCall::function("toolu_2", "get_time", "{}"),
            ]))
            .message(Message::tool("toolu_1", "sunny"))
            .message(Message::tool("toolu_2", "noon"))
            .build()
            .unwrap();

        let body = serde_json::to_value(adapter.transform_request(&config, &request)).unwrap();
        assert_eq!(body["system"], "Be brief.\n\nAnswer in French.");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][0]["type"], "tool_use");
        assert_eq!(messages[1]["content"][0]["input"]["location"], "Paris");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(messages[2]["content"][1]["type"], "tool_result");
        assert_eq!(messages[2]["content"][1]["tool_use_id"], "toolu_2");
    }

    #[test]
    fn test_role_mapping_is_total() {
        let adapter = AnthropicAdapter::new(Client::new());
        assert_eq!(adapter.map_role(Role::System), UpstreamRole::Lifted("system"));
        assert_eq!(adapter.map_role(Role::Tool), UpstreamRole::Degraded("user"));
        for role in Role::ALL {
            assert!(!adapter.map_role(role).name().is_empty());
        }
    }

    #[tokio::test]
    async fn test_tool_use_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant"))
            .and(header("anthropic-version", API_VERSION))
            .and(body_partial_json(json!({"tools": [{"name": "get_weather"}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Let me check."},
                    {"type": "tool_use", "id": "toolu_1", "name": "get_weather",
                     "input": {"location": "Paris"}}
                ],
                "stop_reason": "tool_use"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = ChatRequest::builder()
            .message(Message::user("weather in Paris?"))
            .tool(Tool::function("get_weather", None, None))
            .build()
            .unwrap();
        let outcome = AnthropicAdapter::new(Client::new())
            .chat(&config(&server), &Credential::new("sk-ant"), &request)
            .await
            .unwrap();

        let completion = outcome.into_completion().unwrap();
        let choice = completion.first_choice().unwrap();
        assert!(choice.message.content.is_none());
        assert_eq!(choice.finish_reason, FinishReason::ToolCalls);
        let calls = choice.message.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "toolu_1");
        assert_eq!(calls[0].function.arguments, r#"{"location":"Paris"}"#);
    }

    #[tokio::test]
    async fn test_text_response_with_max_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "Once upon"}],
                "stop_reason": "max_tokens"
            })))
            .mount(&server)
            .await;

        let request = ChatRequest::builder()
            .message(Message::user("story"))
            .max_tokens(2)
            .build()
            .unwrap();
        let outcome = AnthropicAdapter::new(Client::new())
            .chat(&config(&server), &Credential::new("sk-ant"), &request)
            .await
            .unwrap();

        let completion = outcome.into_completion().unwrap();
        let choice = completion.first_choice().unwrap();
        assert_eq!(choice.message.content.as_deref(), Some("Once upon"));
        assert_eq!(choice.finish_reason, FinishReason::Length);
    }

    #[tokio::test]
    async fn test_streaming_text_and_tool_use() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: ping\n",
            "data: {\"type\":\"ping\"}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Checking\"}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":1,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"get_weather\",\"input\":{}}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"location\\\":\\\"Paris\\\"}\"}}\n\n",
            "event: message_delta\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let request = ChatRequest::builder()
            .message(Message::user("weather?"))
            .tool(Tool::function("get_weather", None, None))
            .stream(true)
            .build()
            .unwrap();
        let outcome = AnthropicAdapter::new(Client::new())
            .chat(&config(&server), &Credential::new("sk-ant"), &request)
            .await
            .unwrap();

        let frames: Vec<String> = outcome
            .into_stream()
            .unwrap()
            .collect_frames()
            .await
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect();

        assert_eq!(frames.len(), 5);
        assert!(frames[0].contains(r#""content":"Checking""#));
        assert!(frames[1].contains(r#""id":"toolu_1""#));
        assert!(frames[2].contains(r#"location"#));
        assert!(frames[3].contains(r#""finish_reason":"tool_calls""#));
        assert_eq!(frames[4], "data: [DONE]\n\n");
    }
}
