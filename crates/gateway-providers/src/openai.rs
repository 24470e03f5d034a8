//! OpenAI-compatible provider implementation.
//!
//! Works against the OpenAI API and any server exposing the same
//! `POST {base}/chat/completions` contract. Roles map one-to-one, so
//! canonical messages are sent unchanged.

use crate::sse::{malformed_payload, open_event_source, send_checked, with_deadline, SseStream};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use gateway_core::normalizer::{build_response, id_stamp, synthesize_tool_call_id};
use gateway_core::streaming::{forward_stream, FunctionCallDelta, ToolCallDelta};
use gateway_core::{
    ChatOutcome, ChatRequest, Credential, DeltaStream, FinishReason, Message, ProviderAdapter,
    ProviderConfig, ProviderFamily, ProviderResult, Role, StreamDelta, Tool, ToolCall, ToolType,
    UpstreamRole,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default OpenAI API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const FAMILY: ProviderFamily = ProviderFamily::OpenAi;

/// OpenAI-compatible provider adapter
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    client: Client,
    deadline: Option<Duration>,
}

impl OpenAiAdapter {
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

    fn completions_url(config: &ProviderConfig) -> String {
        let base = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn transform_request<'a>(
        &self,
        config: &'a ProviderConfig,
        request: &'a ChatRequest,
    ) -> OpenAiRequest<'a> {
        OpenAiRequest {
            model: &config.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            tools: request.tools.as_deref().filter(|tools| !tools.is_empty()),
            stream: request.stream,
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn family(&self) -> ProviderFamily {
        FAMILY
    }

    fn map_role(&self, role: Role) -> UpstreamRole {
        match role {
            Role::System => UpstreamRole::Native("system"),
            Role::User => UpstreamRole::Native("user"),
            Role::Assistant => UpstreamRole::Native("assistant"),
            Role::Tool => UpstreamRole::Native("tool"),
        }
    }

    async fn chat(
        &self,
        config: &ProviderConfig,
        credential: &Credential,
        request: &ChatRequest,
    ) -> ProviderResult {
        let url = Self::completions_url(config);
        let body = self.transform_request(config, request);

        debug!(provider = %FAMILY, model = %config.model, stream = request.stream, "Sending request to OpenAI-compatible API");

        let builder = self
            .client
            .post(&url)
            .bearer_auth(credential.expose())
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

        let response: OpenAiResponse = send_checked(FAMILY, builder)
            .await?
            .json()
            .await
            .map_err(|e| malformed_payload(FAMILY, e))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| malformed_payload(FAMILY, "no choices in response"))?;

        let stamp = id_stamp();
        let tool_calls = choice.message.tool_calls.map(|calls| {
            calls
                .into_iter()
                .enumerate()
                .map(|(position, call)| call.into_tool_call(stamp, position))
                .collect()
        });

        Ok(ChatOutcome::Completion(build_response(
            choice.message.content,
            &config.model,
            tool_calls,
            choice.finish_reason.as_deref().and_then(map_finish_reason),
        )))
    }
}

fn map_finish_reason(reason: &str) -> Option<FinishReason> {
    match reason {
        "stop" => Some(FinishReason::Stop),
        "length" => Some(FinishReason::Length),
        "tool_calls" | "function_call" => Some(FinishReason::ToolCalls),
        "content_filter" => Some(FinishReason::ContentFilter),
        _ => None,
    }
}

fn stream_deltas(mut events: SseStream) -> DeltaStream {
    let stream = try_stream! {
        while let Some(event) = events.next().await {
            let event = event?;
            let chunk = match serde_json::from_str::<OpenAiChunk>(&event.data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(provider = %FAMILY, error = %e, "Skipping unparsable chunk");
                    continue;
                }
            };

            let Some(delta) = chunk.choices.into_iter().next().map(|c| c.delta) else {
                continue;
            };

            match delta.tool_calls.filter(|calls| !calls.is_empty()) {
                Some(calls) => {
                    yield StreamDelta::ToolCalls(calls.into_iter().map(Into::into).collect());
                }
                None => {
                    if let Some(text) = delta.content.filter(|text| !text.is_empty()) {
                        yield StreamDelta::Text(text);
                    }
                }
            }
        }
    };

    Box::pin(stream)
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Tool]>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCall {
    #[serde(default)]
    id: Option<String>,
    function: OpenAiFunction,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl OpenAiToolCall {
    fn into_tool_call(self, stamp: i64, position: usize) -> ToolCall {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| synthesize_tool_call_id(stamp, position));
        ToolCall::function(id, self.function.name, self.function.arguments)
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChunkChoice {
    #[serde(default)]
    delta: OpenAiDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OpenAiFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

impl From<OpenAiToolCallDelta> for ToolCallDelta {
    fn from(delta: OpenAiToolCallDelta) -> Self {
        let function = delta.function.unwrap_or_default();
        Self {
            index: delta.index,
            tool_type: delta.id.as_ref().map(|_| ToolType::Function),
            id: delta.id,
            function: FunctionCallDelta {
                name: function.name,
                arguments: function.arguments,
            },
        }
    }
}
