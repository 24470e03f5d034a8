//! Response types for the gateway.
//!
//! The canonical non-streaming envelope, shaped as an OpenAI chat completion.

use crate::request::{Role, ToolCall};
use serde::{Deserialize, Serialize};

/// Canonical chat completion response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    /// Response identifier
    pub id: String,
    /// Object type, always `chat.completion`
    pub object: String,
    /// Creation time (unix seconds)
    pub created: i64,
    /// Model that served the request
    pub model: String,
    /// Completion choices
    pub choices: Vec<Choice>,
}

impl ChatCompletion {
    /// First choice, if any
    #[must_use]
    pub fn first_choice(&self) -> Option<&Choice> {
        self.choices.first()
    }
}

/// A single completion choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Choice index
    pub index: u32,
    /// Generated message
    pub message: ResponseMessage,
    /// Why generation stopped
    pub finish_reason: FinishReason,
}

/// Message in a completion choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Always assistant
    pub role: Role,
    /// Text content; serialized as `null` when tool calls are present
    pub content: Option<String>,
    /// Tool calls requested by the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Finish reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop
    Stop,
    /// Token limit reached
    Length,
    /// Model requested tool calls
    ToolCalls,
    /// Output filtered upstream
    ContentFilter,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Length => write!(f, "length"),
            Self::ToolCalls => write!(f, "tool_calls"),
            Self::ContentFilter => write!(f, "content_filter"),
        }
    }
}
