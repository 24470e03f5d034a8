//! Google Gemini provider implementation.
//!
//! Uses the Google AI Studio API:
//! `https://generativelanguage.googleapis.com/v1beta/models/{MODEL}:generateContent`
//! and `:streamGenerateContent?alt=sse` for streaming.
//!
//! # Role mapping
//! - `system`: lifted into `systemInstruction`
//! - `user`: sent as `user`
//! - `assistant`: sent as `model`; tool calls become `functionCall` parts
//! - `tool`: sent as `user` carrying a `functionResponse` part. The function
//!   name is recovered from the assistant tool call with the same id.

use crate::sse::{event_stream, malformed_payload, send_checked, with_deadline, SseStream};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use gateway_core::normalizer::{build_response, id_stamp, synthesize_tool_call_id};
use gateway_core::streaming::{forward_stream, FunctionCallDelta, ToolCallDelta};
use gateway_core::{
    ChatOutcome, ChatRequest, Credential, DeltaStream, FinishReason, Message, ProviderAdapter,
    ProviderConfig, ProviderFamily, ProviderResult, Role, StreamDelta, ToolCall, ToolType,
    UpstreamRole,
};
use reqwest::Client;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Default Google AI Studio base URL
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const FAMILY: ProviderFamily = ProviderFamily::Google;

/// Google Gemini provider adapter
#[derive(Debug, Clone)]
pub struct GoogleAdapter {
    client: Client,
    deadline: Option<Duration>,
}

impl GoogleAdapter {
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

    /// Get the endpoint URL for a model
    fn endpoint_url(config: &ProviderConfig, streaming: bool) -> String {
        let base = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        let action = if streaming {
            "streamGenerateContent?alt=sse"
        } else {
            "generateContent"
        };
        format!("{base}/v1beta/models/{}:{action}", config.model)
    }

    /// Transform canonical request to Gemini format
    fn transform_request(&self, request: &ChatRequest) -> GeminiRequest {
        let call_names: HashMap<&str, &str> = request
            .messages
            .iter()
            .flat_map(|m| m.tool_calls.iter().flatten())
            .map(|call| (call.id.as_str(), call.function.name.as_str()))
            .collect();

        let mut system_parts = Vec::new();
        let mut contents: Vec<GeminiContent> = Vec::new();

        for message in &request.messages {
            let role = match self.map_role(message.role) {
                UpstreamRole::Lifted(_) => {
                    if !message.text().is_empty() {
                        system_parts.push(GeminiPart::Text {
                            text: message.text().to_string(),
                        });
                    }
                    continue;
                }
                UpstreamRole::Native(role) | UpstreamRole::Degraded(role) => role,
            };

            let parts = message_parts(message, &call_names);
            if parts.is_empty() {
                continue;
            }

            match contents.last_mut() {
                Some(last) if last.role == Some(role) => last.parts.extend(parts),
                _ => contents.push(GeminiContent {
                    role: Some(role),
                    parts,
                }),
            }
        }

        let generation_config = GenerationConfig {
            temperature: request.temperature,
            top_p: request.top_p,
            max_output_tokens: request.max_tokens,
        };

        let tools = request.tools.as_ref().filter(|t| !t.is_empty()).map(|tools| {
            vec![GeminiTool {
                function_declarations: tools
                    .iter()
                    .map(|t| FunctionDeclaration {
                        name: t.function.name.clone(),
                        description: t.function.description.clone(),
                        parameters: t.function.parameters.clone(),
                    })
                    .collect(),
            }]
        });

        GeminiRequest {
            contents,
            system_instruction: (!system_parts.is_empty()).then_some(GeminiContent {
                role: None,
                parts: system_parts,
            }),
            generation_config: (!generation_config.is_empty()).then_some(generation_config),
            tools,
        }
    }
}

fn message_parts(message: &Message, call_names: &HashMap<&str, &str>) -> Vec<GeminiPart> {
    match message.role {
        Role::Tool => {
            let name = message
                .tool_call_id
                .as_deref()
                .and_then(|id| call_names.get(id).copied())
                .or(message.name.as_deref())
                .unwrap_or("tool")
                .to_string();
            let response = match serde_json::from_str::<Value>(message.text()) {
                Ok(value @ Value::Object(_)) => value,
                _ => serde_json::json!({ "content": message.text() }),
            };
            vec![GeminiPart::FunctionResponse {
                function_response: FunctionResponseData { name, response },
            }]
        }
        Role::Assistant => {
            let mut parts = Vec::new();
            if !message.text().is_empty() {
                parts.push(GeminiPart::Text {
                    text: message.text().to_string(),
                });
            }
            for call in message.tool_calls.iter().flatten() {
                parts.push(GeminiPart::FunctionCall {
                    function_call: FunctionCallData {
                        name: call.function.name.clone(),
                        args: serde_json::from_str(&call.function.arguments)
                            .unwrap_or_else(|_| Value::Object(serde_json::Map::new())),
                    },
                });
            }
            parts
        }
        Role::System | Role::User => {
            if message.text().is_empty() {
                Vec::new()
            } else {
                vec![GeminiPart::Text {
                    text: message.text().to_string(),
                }]
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn family(&self) -> ProviderFamily {
        FAMILY
    }

    fn map_role(&self, role: Role) -> UpstreamRole {
        match role {
            Role::System => UpstreamRole::Lifted("systemInstruction"),
            Role::User => UpstreamRole::Native("user"),
            Role::Assistant => UpstreamRole::Native("model"),
            Role::Tool => UpstreamRole::Degraded("user"),
        }
    }

    async fn chat(
        &self,
        config: &ProviderConfig,
        credential: &Credential,
        request: &ChatRequest,
    ) -> ProviderResult {
        let url = Self::endpoint_url(config, request.stream);
        let body = self.transform_request(request);

        debug!(
            provider = %FAMILY,
            model = %config.model,
            stream = request.stream,
            "Sending chat request to Gemini"
        );

        let builder = self
            .client
            .post(&url)
            .header("x-goog-api-key", credential.expose())
            .json(&body);
        let builder = with_deadline(builder, self.deadline, request.stream);
        let response = send_checked(FAMILY, builder).await?;

        if request.stream {
            trace!(provider = %FAMILY, "Gemini stream opened");
            return Ok(ChatOutcome::Stream(forward_stream(
                stream_deltas(event_stream(FAMILY, response)),
                config.model.clone(),
                request.has_tools(),
            )));
        }

        let response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| malformed_payload(FAMILY, e))?;
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| malformed_payload(FAMILY, "no candidates in response"))?;

        let finish_reason = candidate.finish_reason.as_deref().map(map_finish_reason);
        let (text, calls) = candidate.content.map(split_parts).unwrap_or_default();
        let stamp = id_stamp();
        let tool_calls = calls
            .into_iter()
            .enumerate()
            .map(|(position, call)| call.into_tool_call(stamp, position))
            .collect();

        Ok(ChatOutcome::Completion(build_response(
            Some(text),
            &config.model,
            Some(tool_calls),
            finish_reason,
        )))
    }
}

/// Map Gemini finish reason to canonical form
fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            FinishReason::ContentFilter
        }
        _ => FinishReason::Stop,
    }
}

fn split_parts(content: GeminiResponseContent) -> (String, Vec<ResponseFunctionCall>) {
    let mut text = String::new();
    let mut calls = Vec::new();
    for part in content.parts {
        match part {
            ResponsePart::FunctionCall { function_call } => calls.push(function_call),
            ResponsePart::Text { text: fragment } => text.push_str(&fragment),
            ResponsePart::Other(_) => {}
        }
    }
    (text, calls)
}

fn stream_deltas(mut events: SseStream) -> DeltaStream {
    let stream = try_stream! {
        let stamp = id_stamp();
        let mut next_tool_index = 0_usize;

        while let Some(event) = events.next().await {
            let event = event?;
            let chunk = match serde_json::from_str::<GeminiResponse>(&event.data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(provider = %FAMILY, error = %e, "Skipping unparsable Gemini chunk");
                    continue;
                }
            };

            let Some(content) = chunk.candidates.into_iter().next().and_then(|c| c.content) else {
                continue;
            };
            let (text, calls) = split_parts(content);

            if calls.is_empty() {
                if !text.is_empty() {
                    yield StreamDelta::Text(text);
                }
                continue;
            }

            let deltas = calls
                .into_iter()
                .map(|call| {
                    let position = next_tool_index;
                    next_tool_index += 1;
                    let call = call.into_tool_call(stamp, position);
                    ToolCallDelta {
                        index: position as u32,
                        id: Some(call.id),
                        tool_type: Some(ToolType::Function),
                        function: FunctionCallDelta {
                            name: Some(call.function.name),
                            arguments: Some(call.function.arguments),
                        },
                    }
                })
                .collect();
            yield StreamDelta::ToolCalls(deltas);
        }
    };

    Box::pin(stream)
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCallData,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponseData,
    },
}

#[derive(Debug, Serialize)]
struct FunctionCallData {
    name: String,
    args: Value,
}

#[derive(Debug, Serialize)]
struct FunctionResponseData {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

impl GenerationConfig {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.top_p.is_none() && self.max_output_tokens.is_none()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponsePart {
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: ResponseFunctionCall,
    },
    Text {
        text: String,
    },
    Other(IgnoredAny),
}

#[derive(Debug, Deserialize)]
struct ResponseFunctionCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

impl ResponseFunctionCall {
    fn into_tool_call(self, stamp: i64, position: usize) -> ToolCall {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| synthesize_tool_call_id(stamp, position));
        let arguments = match self.args {
            Value::Null => "{}".to_string(),
            args => args.to_string(),
        };
        ToolCall::function(id, self.name, arguments)
    }
}
