//! Streaming types and the stream forwarder.
//!
//! Adapters parse their upstream token stream into [`StreamDelta`] items and
//! hand it to [`forward_stream`]. The forwarder runs as a producer task that
//! writes canonical SSE frames into a bounded channel; the returned
//! [`ChunkStream`] is the consumer end and becomes the HTTP response body.
//!
//! Frame sequence: one frame per upstream delta (the first carries
//! `role: assistant`), one terminal frame with the finish reason, then the
//! `[DONE]` sentinel. Dropping the [`ChunkStream`] cancels the producer and
//! releases the upstream stream.

use crate::error::{GatewayError, GatewayResult};
use crate::normalizer::{build_stream_chunk, done_frame, terminal_finish_reason};
use crate::request::{Role, ToolType};
use crate::response::FinishReason;
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Capacity of the frame channel between producer and consumer
pub const STREAM_BUFFER: usize = 32;

/// Upstream chunk stream after provider-specific parsing
pub type DeltaStream = BoxStream<'static, GatewayResult<StreamDelta>>;

/// Canonical streaming chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Chunk identifier
    pub id: String,
    /// Object type, always `chat.completion.chunk`
    pub object: String,
    /// Creation time (unix seconds)
    pub created: i64,
    /// Model that served the request
    pub model: String,
    /// Chunk choices
    pub choices: Vec<ChunkChoice>,
}

/// Choice within a streaming chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Choice index
    pub index: u32,
    /// Incremental delta
    pub delta: ChunkDelta,
    /// Finish reason, set only on the terminal chunk
    pub finish_reason: Option<FinishReason>,
}

/// Incremental message delta
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Role, present only on the first chunk of a stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Text fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Partial tool calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Partial tool call inside a streaming delta
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    /// Position of the call in the batch
    pub index: u32,
    /// Call identifier (first fragment only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool type (first fragment only)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub tool_type: Option<ToolType>,
    /// Function fragment
    pub function: FunctionCallDelta,
}

/// Partial function call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCallDelta {
    /// Function name (first fragment only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Arguments fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// One upstream chunk resolved to canonical form.
///
/// Tool-call data wins over text when an upstream chunk carries both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDelta {
    /// Text fragment
    Text(String),
    /// Tool call fragments
    ToolCalls(Vec<ToolCallDelta>),
}

impl From<StreamDelta> for ChunkDelta {
    fn from(delta: StreamDelta) -> Self {
        match delta {
            StreamDelta::Text(text) => Self {
                content: Some(text),
                ..Self::default()
            },
            StreamDelta::ToolCalls(calls) => Self {
                tool_calls: Some(calls),
                ..Self::default()
            },
        }
    }
}

/// Consumer end of a forwarded stream: a sequence of SSE frames.
pub struct ChunkStream {
    rx: mpsc::Receiver<Bytes>,
}

impl ChunkStream {
    fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx }
    }

    /// Drain the stream into its frames
    pub async fn collect_frames(self) -> Vec<Bytes> {
        self.map(|frame| match frame {
            Ok(bytes) => bytes,
            Err(never) => match never {},
        })
        .collect()
        .await
    }
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream")
            .field("closed", &self.rx.is_closed())
            .finish()
    }
}

impl Stream for ChunkStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}

/// Spawn the producer task for an upstream delta stream.
///
/// Must be called from within a tokio runtime.
pub fn forward_stream(upstream: DeltaStream, model: String, declared_tools: bool) -> ChunkStream {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(produce(upstream, tx, model, declared_tools));
    ChunkStream::new(rx)
}

async fn produce(
    mut upstream: DeltaStream,
    tx: mpsc::Sender<Bytes>,
    model: String,
    declared_tools: bool,
) {
    let mut first = true;
    let mut forwarded = 0_usize;

    loop {
        let next = tokio::select! {
            () = tx.closed() => {
                debug!(model = %model, forwarded, "Stream consumer closed, releasing upstream");
                return;
            }
            next = upstream.next() => next,
        };

        match next {
            Some(Ok(delta)) => {
                let mut delta = ChunkDelta::from(delta);
                if first {
                    delta.role = Some(Role::Assistant);
                    first = false;
                }
                if !send_chunk(&tx, delta, &model, None).await {
                    return;
                }
                forwarded += 1;
            }
            Some(Err(err)) => {
                warn!(model = %model, forwarded, error = %err, "Upstream stream failed");
                let _ = tx.send(error_frame(&err)).await;
                return;
            }
            None => break,
        }
    }

    let terminal = ChunkDelta {
        role: first.then_some(Role::Assistant),
        ..ChunkDelta::default()
    };
    let finish_reason = terminal_finish_reason(declared_tools);
    if !send_chunk(&tx, terminal, &model, Some(finish_reason)).await {
        return;
    }
    let _ = tx.send(done_frame()).await;

    debug!(model = %model, forwarded, finish_reason = %finish_reason, "Stream completed");
}

/// Returns false once the stream must stop.
async fn send_chunk(
    tx: &mpsc::Sender<Bytes>,
    delta: ChunkDelta,
    model: &str,
    finish_reason: Option<FinishReason>,
) -> bool {
    match build_stream_chunk(delta, model, finish_reason) {
        Ok(frame) => tx.send(frame).await.is_ok(),
        Err(err) => {
            warn!(model = %model, error = %err, "Failed to encode stream chunk");
            let _ = tx.send(error_frame(&err)).await;
            false
        }
    }
}

fn error_frame(err: &GatewayError) -> Bytes {
    let body = serde_json::json!({
        "error": {
            "message": err.to_string(),
            "type": "stream_error",
        }
    });
    Bytes::from(format!("data: {body}\n\n"))
}
