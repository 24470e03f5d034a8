//! Cloudflare Workers AI provider implementation.
//!
//! The upstream is reached through an injected [`WorkersAiBinding`];
//! [`RestBinding`] talks to the Cloudflare REST API:
//! `POST {base}/accounts/{account_id}/ai/run/{model}`.
//!
//! # Role mapping
//! - `system`, `user`, `assistant`: sent as-is
//! - `tool`: sent as `user`, content rewritten into a tool-result note
//!   (Workers AI chat models have no tool role)
//! - assistant tool calls are rendered into the assistant text
//!
//! # Output shapes
//! Workers AI returns differently shaped payloads depending on the model.
//! The raw output is probed structurally, after unwrapping the
//! `{result, success}` envelope:
//! - JSON string: text
//! - object with non-empty `tool_calls`: tool calls
//! - object with `response`: text
//! - anything else: malformed payload

use crate::sse::{event_stream, malformed_payload, send_checked, with_deadline, SseStream};
use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use gateway_core::normalizer::{build_response, id_stamp, synthesize_tool_call_id};
use gateway_core::streaming::{forward_stream, FunctionCallDelta, ToolCallDelta};
use gateway_core::{
    ChatOutcome, ChatRequest, Credential, DeltaStream, GatewayError, GatewayResult, Message,
    ProviderAdapter, ProviderConfig, ProviderFamily, ProviderResult, Role, StreamDelta, ToolCall,
    ToolType, UpstreamRole,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default Cloudflare API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

const FAMILY: ProviderFamily = ProviderFamily::WorkersAi;

/// Input payload for a Workers AI text-generation model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkersAiInput {
    /// Conversation messages
    pub messages: Vec<WorkersAiMessage>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Function tools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WorkersAiTool>>,
    /// Stream tokens as server-sent events
    pub stream: bool,
}

/// Workers AI chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkersAiMessage {
    /// Upstream role
    pub role: &'static str,
    /// Text content
    pub content: String,
}

/// Workers AI function tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkersAiTool {
    /// Function name
    pub name: String,
    /// Function description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the arguments
    pub parameters: Value,
}

/// Raw output of a binding call
pub enum WorkersAiOutput {
    /// Complete JSON body
    Complete(Bytes),
    /// Server-sent event stream
    Stream(SseStream),
}

impl std::fmt::Debug for WorkersAiOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(body) => f.debug_tuple("Complete").field(&body.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Access to the Workers AI runtime
#[async_trait]
pub trait WorkersAiBinding: Send + Sync {
    /// Run a model with one credential
    async fn run(
        &self,
        config: &ProviderConfig,
        credential: &Credential,
        input: &WorkersAiInput,
    ) -> GatewayResult<WorkersAiOutput>;
}

/// Binding over the Cloudflare REST API
#[derive(Debug, Clone)]
pub struct RestBinding {
    client: Client,
    deadline: Option<Duration>,
}

impl RestBinding {
    /// Create a REST binding on a shared HTTP client
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

    fn run_url(config: &ProviderConfig) -> GatewayResult<String> {
        let account_id = config.account_id.as_deref().ok_or_else(|| {
            GatewayError::provider(
                FAMILY.as_str(),
                "Workers AI requires an account_id",
                None,
                false,
            )
        })?;
        let base = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');

        Ok(format!(
            "{base}/accounts/{account_id}/ai/run/{}",
            config.model
        ))
    }
}

#[async_trait]
impl WorkersAiBinding for RestBinding {
    async fn run(
        &self,
        config: &ProviderConfig,
        credential: &Credential,
        input: &WorkersAiInput,
    ) -> GatewayResult<WorkersAiOutput> {
        let url = Self::run_url(config)?;
        debug!(provider = %FAMILY, model = %config.model, stream = input.stream, "Sending request to Workers AI");

        let request = self
            .client
            .post(&url)
            .bearer_auth(credential.expose())
            .json(input);
        let request = with_deadline(request, self.deadline, input.stream);
        let response = send_checked(FAMILY, request).await?;

        if input.stream {
            return Ok(WorkersAiOutput::Stream(event_stream(FAMILY, response)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| malformed_payload(FAMILY, format!("failed to read body: {e}")))?;
        Ok(WorkersAiOutput::Complete(body))
    }
}

/// Workers AI provider adapter
pub struct WorkersAiAdapter {
    binding: Arc<dyn WorkersAiBinding>,
}

impl WorkersAiAdapter {
    /// Create an adapter over a binding
    #[must_use]
    pub fn new(binding: Arc<dyn WorkersAiBinding>) -> Self {
        Self { binding }
    }

    /// Create an adapter over the REST API
    #[must_use]
    pub fn rest(client: Client) -> Self {
        Self::new(Arc::new(RestBinding::new(client)))
    }

    fn transform_request(&self, request: &ChatRequest) -> WorkersAiInput {
        let messages = request
            .messages
            .iter()
            .map(|message| WorkersAiMessage {
                role: self.map_role(message.role).name(),
                content: render_content(message),
            })
            .collect();

        let tools = request.tools.as_ref().filter(|t| !t.is_empty()).map(|tools| {
            tools
                .iter()
                .map(|tool| WorkersAiTool {
                    name: tool.function.name.clone(),
                    description: tool.function.description.clone(),
                    parameters: tool
                        .function
                        .parameters
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
                })
                .collect()
        });

        WorkersAiInput {
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            tools,
            stream: request.stream,
        }
    }
}

impl std::fmt::Debug for WorkersAiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkersAiAdapter").finish_non_exhaustive()
    }
}

#[async_trait]
impl ProviderAdapter for WorkersAiAdapter {
    fn family(&self) -> ProviderFamily {
        FAMILY
    }

    fn map_role(&self, role: Role) -> UpstreamRole {
        match role {
            Role::System => UpstreamRole::Native("system"),
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
        let input = self.transform_request(request);
        let output = self.binding.run(config, credential, &input).await?;

        match (request.stream, output) {
            (false, WorkersAiOutput::Complete(body)) => {
                let reply = probe_output(&body)?;
                let completion = match reply {
                    Reply::Text(text) => build_response(Some(text), &config.model, None, None),
                    Reply::ToolCalls(calls) => build_response(None, &config.model, Some(calls), None),
                };
                Ok(ChatOutcome::Completion(completion))
            }
            (true, WorkersAiOutput::Complete(body)) => {
                let delta = match probe_output(&body)? {
                    Reply::Text(text) => StreamDelta::Text(text),
                    Reply::ToolCalls(calls) => StreamDelta::ToolCalls(
                        calls.into_iter().enumerate().map(tool_call_delta).collect(),
                    ),
                };
                let deltas: DeltaStream = futures::stream::iter([Ok(delta)]).boxed();
                Ok(ChatOutcome::Stream(forward_stream(
                    deltas,
                    config.model.clone(),
                    request.has_tools(),
                )))
            }
            (true, WorkersAiOutput::Stream(events)) => Ok(ChatOutcome::Stream(forward_stream(
                stream_deltas(events),
                config.model.clone(),
                request.has_tools(),
            ))),
            (false, WorkersAiOutput::Stream(_)) => Err(malformed_payload(
                FAMILY,
                "stream returned for a non-streaming request",
            )),
        }
    }
}

fn render_content(message: &Message) -> String {
    match message.role {
        Role::Tool => match message.tool_call_id.as_deref() {
            Some(id) => format!("Tool result ({id}): {}", message.text()),
            None => format!("Tool result: {}", message.text()),
        },
        Role::Assistant => match message.tool_calls.as_deref() {
            Some(calls) if !calls.is_empty() && message.text().is_empty() => calls
                .iter()
                .map(|call| {
                    format!(
                        "Called tool {} with arguments {}",
                        call.function.name, call.function.arguments
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            _ => message.text().to_string(),
        },
        Role::System | Role::User => message.text().to_string(),
    }
}

/// Canonical reading of one Workers AI output
#[derive(Debug, PartialEq, Eq)]
enum Reply {
    Text(String),
    ToolCalls(Vec<ToolCall>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawOutput {
    Envelope {
        #[serde(default)]
        result: Option<Box<RawOutput>>,
        success: bool,
        #[serde(default)]
        errors: Vec<RawError>,
    },
    Text(String),
    Tools {
        tool_calls: Vec<RawToolCall>,
        #[serde(default)]
        response: Option<String>,
    },
    Response {
        response: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawToolCall {
    Nested {
        #[serde(default)]
        id: Option<String>,
        function: RawFunction,
    },
    Flat {
        #[serde(default)]
        id: Option<String>,
        name: String,
        #[serde(default)]
        arguments: Value,
    },
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl RawToolCall {
    fn into_tool_call(self, stamp: i64, position: usize) -> ToolCall {
        let (id, name, arguments) = match self {
            Self::Nested { id, function } => (id, function.name, function.arguments),
            Self::Flat {
                id,
                name,
                arguments,
            } => (id, name, arguments),
        };
        let id = id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| synthesize_tool_call_id(stamp, position));
        ToolCall::function(id, name, arguments_string(arguments))
    }
}

fn arguments_string(arguments: Value) -> String {
    match arguments {
        Value::String(raw) => raw,
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

fn convert_tool_calls(calls: Vec<RawToolCall>) -> Vec<ToolCall> {
    let stamp = id_stamp();
    calls
        .into_iter()
        .enumerate()
        .map(|(position, call)| call.into_tool_call(stamp, position))
        .collect()
}

impl RawOutput {
    fn resolve(self) -> GatewayResult<Reply> {
        match self {
            Self::Envelope {
                success: false,
                errors,
                ..
            } => {
                let message = if errors.is_empty() {
                    "request unsuccessful".to_string()
                } else {
                    errors
                        .into_iter()
                        .map(|e| e.message)
                        .collect::<Vec<_>>()
                        .join("; ")
                };
                Err(GatewayError::provider(FAMILY.as_str(), message, None, true))
            }
            Self::Envelope {
                result: Some(inner),
                ..
            } => inner.resolve(),
            Self::Envelope { result: None, .. } => {
                Err(malformed_payload(FAMILY, "envelope without result"))
            }
            Self::Text(text) => Ok(Reply::Text(text)),
            Self::Tools { tool_calls, .. } if !tool_calls.is_empty() => {
                Ok(Reply::ToolCalls(convert_tool_calls(tool_calls)))
            }
            Self::Tools {
                response: Some(text),
                ..
            }
            | Self::Response { response: text } => Ok(Reply::Text(text)),
            Self::Tools { response: None, .. } => Err(malformed_payload(
                FAMILY,
                "object has neither tool calls nor a response",
            )),
        }
    }
}

fn probe_output(body: &[u8]) -> GatewayResult<Reply> {
    serde_json::from_slice::<RawOutput>(body)
        .map_err(|_| malformed_payload(FAMILY, "unrecognized output shape"))?
        .resolve()
}

fn tool_call_delta((position, call): (usize, ToolCall)) -> ToolCallDelta {
    ToolCallDelta {
        index: position as u32,
        id: Some(call.id),
        tool_type: Some(ToolType::Function),
        function: FunctionCallDelta {
            name: Some(call.function.name),
            arguments: Some(call.function.arguments),
        },
    }
}

#[derive(Debug, Deserialize)]
struct RawChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<RawToolCall>>,
}

/// Parse Workers AI stream events into deltas
fn stream_deltas(mut events: SseStream) -> DeltaStream {
    let stream = try_stream! {
        let stamp = id_stamp();
        let mut next_tool_index = 0_usize;

        while let Some(event) = events.next().await {
            let event = event?;
            let chunk = match serde_json::from_str::<RawChunk>(&event.data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(provider = %FAMILY, error = %e, "Skipping unparsable Workers AI chunk");
                    continue;
                }
            };

            match chunk.tool_calls.filter(|calls| !calls.is_empty()) {
                Some(calls) => {
                    let deltas = calls
                        .into_iter()
                        .map(|call| {
                            let position = next_tool_index;
                            next_tool_index += 1;
                            tool_call_delta((position, call.into_tool_call(stamp, position)))
                        })
                        .collect();
                    yield StreamDelta::ToolCalls(deltas);
                }
                None => {
                    if let Some(text) = chunk.response.filter(|text| !text.is_empty()) {
                        yield StreamDelta::Text(text);
                    }
                }
            }
        }
    };

    Box::pin(stream)
}
