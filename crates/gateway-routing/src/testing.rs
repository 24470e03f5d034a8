//! Scripted adapter for router and rotator tests.

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use gateway_core::{
    build_response, forward_stream, ChatOutcome, ChatRequest, Credential, GatewayError,
    Message, ProviderAdapter, ProviderConfig, ProviderFamily, ProviderResult, Role, StreamDelta,
    ToolCall, UpstreamRole,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Scripted reply for one credential
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(&'static str),
    ToolCall(&'static str, serde_json::Value),
    Fail(&'static str),
    /// Non-retryable upstream rejection
    Reject(&'static str),
    Panic,
}

#[derive(Debug)]
pub struct MockAdapter {
    family: ProviderFamily,
    replies: HashMap<String, MockReply>,
    calls: Mutex<Vec<String>>,
}

pub struct MockAdapterBuilder {
    family: ProviderFamily,
    replies: HashMap<String, MockReply>,
}

impl MockAdapterBuilder {
    pub fn reply(mut self, secret: &str, reply: MockReply) -> Self {
        self.replies.insert(secret.to_string(), reply);
        self
    }

    pub fn build(self) -> Arc<MockAdapter> {
        Arc::new(MockAdapter {
            family: self.family,
            replies: self.replies,
            calls: Mutex::new(Vec::new()),
        })
    }
}

impl MockAdapter {
    #[allow(clippy::new_ret_no_self)]
    pub fn new(family: ProviderFamily) -> MockAdapterBuilder {
        MockAdapterBuilder {
            family,
            replies: HashMap::new(),
        }
    }

    /// Credential secrets seen, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, secret: &str) -> usize {
        self.calls().iter().filter(|s| *s == secret).count()
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn family(&self) -> ProviderFamily {
        self.family
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
        self.calls
            .lock()
            .unwrap()
            .push(credential.expose().to_string());

        let reply = self
            .replies
            .get(credential.expose())
            .cloned()
            .unwrap_or(MockReply::Fail("no scripted reply"));

        match reply {
            MockReply::Fail(message) => Err(GatewayError::provider(
                self.family.as_str(),
                message,
                Some(401),
                true,
            )),
            MockReply::Reject(message) => Err(GatewayError::provider(
                self.family.as_str(),
                message,
                Some(400),
                false,
            )),
            MockReply::Panic => panic!("scripted adapter panic"),
            MockReply::Text(text) if request.stream => {
                let deltas = stream::iter(vec![Ok(StreamDelta::Text(text.to_string()))]).boxed();
                Ok(ChatOutcome::Stream(forward_stream(
                    deltas,
                    config.model.clone(),
                    request.has_tools(),
                )))
            }
            MockReply::Text(text) => Ok(ChatOutcome::Completion(build_response(
                Some(text.to_string()),
                &config.model,
                None,
                None,
            ))),
            MockReply::ToolCall(name, arguments) => {
                let call = ToolCall::function("call_mock_0", name, arguments.to_string());
                Ok(ChatOutcome::Completion(build_response(
                    None,
                    &config.model,
                    Some(vec![call]),
                    None,
                )))
            }
        }
    }
}

/// Single-user-message request
pub fn chat_request(prompt: &str) -> ChatRequest {
    ChatRequest::builder()
        .message(Message::user(prompt))
        .build()
        .unwrap()
}
