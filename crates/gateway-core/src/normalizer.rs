//! Response normalization.
//!
//! Pure builders for the canonical wire envelopes. All schema invariants live
//! here so that no adapter can drift from the contract:
//! - tool calls present: `content` is `null`, `finish_reason` is `tool_calls`
//! - no tool calls: `finish_reason` is the supplied reason or `stop`, never
//!   `tool_calls`

use crate::error::GatewayResult;
use crate::request::{Role, ToolCall};
use crate::response::{ChatCompletion, Choice, FinishReason, ResponseMessage};
use crate::streaming::{ChatChunk, ChunkChoice, ChunkDelta};
use bytes::Bytes;
use chrono::Utc;

/// Sentinel terminating a canonical stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Build a canonical non-streaming response
#[must_use]
pub fn build_response(
    content: Option<String>,
    model: &str,
    tool_calls: Option<Vec<ToolCall>>,
    finish_reason: Option<FinishReason>,
) -> ChatCompletion {
    let tool_calls = tool_calls.filter(|calls| !calls.is_empty());

    let (content, finish_reason) = if tool_calls.is_some() {
        (None, FinishReason::ToolCalls)
    } else {
        (
            Some(content.unwrap_or_default()),
            settle_finish_reason(finish_reason),
        )
    };

    ChatCompletion {
        id: completion_id(),
        object: "chat.completion".to_string(),
        created: Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: Role::Assistant,
                content,
                tool_calls,
            },
            finish_reason,
        }],
    }
}

/// Build one canonical stream chunk as an SSE frame
///
/// # Errors
/// Returns error if the chunk cannot be serialized
pub fn build_stream_chunk(
    mut delta: ChunkDelta,
    model: &str,
    finish_reason: Option<FinishReason>,
) -> GatewayResult<Bytes> {
    if delta.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty()) {
        delta.content = None;
    } else {
        delta.tool_calls = None;
    }

    let chunk = ChatChunk {
        id: completion_id(),
        object: "chat.completion.chunk".to_string(),
        created: Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    };

    let json = serde_json::to_string(&chunk)?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

/// The `[DONE]` sentinel frame
#[must_use]
pub fn done_frame() -> Bytes {
    Bytes::from(format!("data: {DONE_SENTINEL}\n\n"))
}

/// Finish reason of a stream's terminal chunk
#[must_use]
pub fn terminal_finish_reason(declared_tools: bool) -> FinishReason {
    if declared_tools {
        FinishReason::ToolCalls
    } else {
        FinishReason::Stop
    }
}

/// Synthesize a tool call id for upstreams that omit one.
///
/// Unique within one response: `stamp` is fixed per response and `position`
/// is the call's index in the batch.
#[must_use]
pub fn synthesize_tool_call_id(stamp: i64, position: usize) -> String {
    format!("call_{stamp}_{position}")
}

/// Millisecond stamp used for synthesized ids
#[must_use]
pub fn id_stamp() -> i64 {
    Utc::now().timestamp_millis()
}

fn settle_finish_reason(finish_reason: Option<FinishReason>) -> FinishReason {
    match finish_reason {
        None | Some(FinishReason::ToolCalls) => FinishReason::Stop,
        Some(reason) => reason,
    }
}

fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::{FunctionCallDelta, ToolCallDelta};
    use serde_json::Value;

    fn parse_frame(frame: &Bytes) -> Value {
        let text = std::str::from_utf8(frame).expect("utf8");
        assert!(text.starts_with("data: "));
        assert!(text.ends_with("\n\n"));
        serde_json::from_str(text["data: ".len()..].trim_end()).expect("json")
    }

    #[test]
    fn test_text_response() {
        let response = build_response(Some("4".to_string()), "m", None, None);
        let choice = response.first_choice().expect("choice");
        assert_eq!(choice.message.content.as_deref(), Some("4"));
        assert_eq!(choice.finish_reason, FinishReason::Stop);
        assert!(choice.message.tool_calls.is_none());
        assert_eq!(response.object, "chat.completion");
        assert!(response.id.starts_with("chatcmpl-"));
    }

    #[test]
    fn test_tool_calls_clear_content() {
        let calls = vec![ToolCall::function("call_1", "get_weather", "{}")];
        let response = build_response(
            Some("ignored".to_string()),
            "m",
            Some(calls),
            Some(FinishReason::Stop),
        );
        let choice = response.first_choice().expect("choice");
        assert!(choice.message.content.is_none());
        assert_eq!(choice.finish_reason, FinishReason::ToolCalls);

        let json = serde_json::to_value(&response).expect("serialize");
        assert!(json["choices"][0]["message"]["content"].is_null());
        assert_eq!(json["choices"][0]["finish_reason"], "tool_calls");
    }

    #[test]
    fn test_tool_calls_reason_without_calls_becomes_stop() {
        let response = build_response(None, "m", Some(vec![]), Some(FinishReason::ToolCalls));
        let choice = response.first_choice().expect("choice");
        assert_eq!(choice.finish_reason, FinishReason::Stop);
        assert_eq!(choice.message.content.as_deref(), Some(""));
        assert!(choice.message.tool_calls.is_none());
    }

    #[test]
    fn test_stream_chunk_frame() {
        let delta = ChunkDelta {
            role: Some(Role::Assistant),
            content: Some("hi".to_string()),
            tool_calls: None,
        };
        let frame = build_stream_chunk(delta, "m", None).expect("frame");
        let json = parse_frame(&frame);
        assert_eq!(json["object"], "chat.completion.chunk");
        assert_eq!(json["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(json["choices"][0]["delta"]["content"], "hi");
        assert!(json["choices"][0]["finish_reason"].is_null());
    }

    #[test]
    fn test_stream_chunk_prefers_tool_calls() {
        let delta = ChunkDelta {
            role: None,
            content: Some("text".to_string()),
            tool_calls: Some(vec![ToolCallDelta {
                index: 0,
                id: Some("call_1".to_string()),
                tool_type: None,
                function: FunctionCallDelta {
                    name: Some("f".to_string()),
                    arguments: None,
                },
            }]),
        };
        let json = parse_frame(&build_stream_chunk(delta, "m", None).expect("frame"));
        assert!(json["choices"][0]["delta"].get("content").is_none());
        assert_eq!(json["choices"][0]["delta"]["tool_calls"][0]["id"], "call_1");
    }

    #[test]
    fn test_done_frame() {
        assert_eq!(done_frame(), Bytes::from_static(b"data: [DONE]\n\n"));
        assert_eq!(terminal_finish_reason(true), FinishReason::ToolCalls);
        assert_eq!(terminal_finish_reason(false), FinishReason::Stop);
    }

    #[test]
    fn test_synthesized_ids_unique_within_batch() {
        let stamp = id_stamp();
        let a = synthesize_tool_call_id(stamp, 0);
        let b = synthesize_tool_call_id(stamp, 1);
        assert_ne!(a, b);
        assert!(a.starts_with("call_"));
    }
}
