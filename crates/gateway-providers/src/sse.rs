//! Upstream transport helpers shared by the HTTP adapters.
//!
//! Server-sent events arrive either through `reqwest-eventsource` or as a raw
//! byte stream; both are surfaced as [`SseStream`] so the adapters only parse
//! event payloads.

use async_stream::try_stream;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use gateway_core::{GatewayError, GatewayResult, ProviderFamily};
use reqwest::{RequestBuilder, Response};
use reqwest_eventsource::{retry::Never, Error as EventSourceError, Event, EventSource};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

/// Sentinel some upstreams send as the final data payload
const UPSTREAM_DONE: &str = "[DONE]";

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name (`message` when unnamed)
    pub event: String,
    /// Data payload, multi-line data joined by `\n`
    pub data: String,
}

/// Upstream event stream, ending at the upstream's own terminator
pub type SseStream = BoxStream<'static, GatewayResult<SseEvent>>;

/// Upper bound on establishing an upstream connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the shared HTTP client
///
/// `idle_timeout` bounds each read, not the whole exchange, so a stream that
/// keeps producing tokens is never cut off. Adapters put a total deadline on
/// non-streaming calls with [`with_deadline`].
///
/// # Errors
/// Returns error if the client cannot be created
pub fn build_http_client(idle_timeout: Duration) -> GatewayResult<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.min(idle_timeout))
        .read_timeout(idle_timeout)
        .pool_max_idle_per_host(32)
        .build()
        .map_err(|e| GatewayError::internal(format!("Failed to create HTTP client: {e}")))
}

/// Apply the total request deadline unless the call streams
pub(crate) fn with_deadline(
    builder: RequestBuilder,
    deadline: Option<Duration>,
    stream: bool,
) -> RequestBuilder {
    match deadline {
        Some(deadline) if !stream => builder.timeout(deadline),
        _ => builder,
    }
}

/// Convert a transport failure into a provider error
pub(crate) fn transport_error(family: ProviderFamily, err: &reqwest::Error) -> GatewayError {
    let message = if err.is_timeout() {
        format!("Request timed out: {err}")
    } else {
        format!("Request failed: {err}")
    };
    GatewayError::provider(family.as_str(), message, None, true)
}

/// Convert a malformed upstream payload into a provider error
pub(crate) fn malformed_payload(
    family: ProviderFamily,
    detail: impl std::fmt::Display,
) -> GatewayError {
    GatewayError::provider(
        family.as_str(),
        format!("Malformed upstream payload: {detail}"),
        None,
        false,
    )
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Nested { error: ErrorDetail },
    Flat { error: String },
    List { errors: Vec<ErrorDetail> },
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Convert a non-2xx upstream response into a provider error
pub(crate) fn upstream_error(family: ProviderFamily, status: u16, body: &str) -> GatewayError {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody::Nested { error }) => error.message,
        Ok(ErrorBody::Flat { error }) => error,
        Ok(ErrorBody::List { errors }) => errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; "),
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    };

    let retryable = matches!(status, 401 | 403 | 408 | 429 | 500..=599);
    GatewayError::provider(
        family.as_str(),
        format!("HTTP {status}: {message}"),
        Some(status),
        retryable,
    )
}

/// Send a request and reject non-2xx responses
pub(crate) async fn send_checked(
    family: ProviderFamily,
    request: RequestBuilder,
) -> GatewayResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(family, &e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(upstream_error(family, status.as_u16(), &body))
}

/// Open an event source and wait until upstream accepts the stream.
///
/// Failures before the stream opens are ordinary provider failures so the
/// rotator can move on to the next credential.
pub(crate) async fn open_event_source(
    family: ProviderFamily,
    request: RequestBuilder,
) -> GatewayResult<SseStream> {
    let mut source = EventSource::new(request).map_err(|e| {
        GatewayError::provider(
            family.as_str(),
            format!("Failed to create event source: {e}"),
            None,
            false,
        )
    })?;
    source.set_retry_policy(Box::new(Never));

    match source.next().await {
        Some(Ok(Event::Open)) => {
            trace!(provider = %family, "Upstream stream opened");
        }
        Some(Ok(Event::Message(_))) => {
            source.close();
            return Err(malformed_payload(family, "event received before stream opened"));
        }
        Some(Err(EventSourceError::InvalidStatusCode(status, response))) => {
            source.close();
            let body = response.text().await.unwrap_or_default();
            return Err(upstream_error(family, status.as_u16(), &body));
        }
        Some(Err(EventSourceError::InvalidContentType(content_type, _))) => {
            source.close();
            return Err(malformed_payload(
                family,
                format!("unexpected content type {content_type:?}"),
            ));
        }
        Some(Err(e)) => {
            source.close();
            return Err(GatewayError::provider(
                family.as_str(),
                format!("Stream request failed: {e}"),
                None,
                true,
            ));
        }
        None => {
            return Err(GatewayError::provider(
                family.as_str(),
                "Stream closed before opening",
                None,
                true,
            ));
        }
    }

    let stream = try_stream! {
        let mut source = source;
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => {
                    if message.data.trim() == UPSTREAM_DONE {
                        break;
                    }
                    yield SseEvent {
                        event: message.event,
                        data: message.data,
                    };
                }
                Err(EventSourceError::StreamEnded) => break,
                Err(e) => {
                    source.close();
                    Err(GatewayError::streaming(format!("{family} stream error: {e}")))?;
                }
            }
        }
        source.close();
        debug!(provider = %family, "Upstream stream ended");
    };

    Ok(Box::pin(stream))
}

/// Parse a raw `text/event-stream` response body.
///
/// Lines are buffered as bytes so multi-byte characters split across network
/// chunks decode correctly.
pub(crate) fn event_stream(family: ProviderFamily, response: Response) -> SseStream {
    let stream = try_stream! {
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut pending = PendingEvent::default();
        let mut finished = false;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                GatewayError::streaming(format!("{family} stream read failed: {e}"))
            })?;
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                if let Some(event) = pending.feed(line.trim_end_matches(['\r', '\n'])) {
                    if event.data.trim() == UPSTREAM_DONE {
                        finished = true;
                        break;
                    }
                    yield event;
                }
            }
            if finished {
                break;
            }
        }

        if !finished {
            let rest = String::from_utf8_lossy(&buffer).into_owned();
            let rest = rest.trim_end_matches(['\r', '\n']);
            if !rest.is_empty() {
                pending.feed(rest);
            }
            if let Some(event) = pending.dispatch() {
                if event.data.trim() != UPSTREAM_DONE {
                    yield event;
                }
            }
        }
    };

    Box::pin(stream)
}

#[derive(Debug, Default)]
struct PendingEvent {
    event: Option<String>,
    data: Vec<String>,
}

impl PendingEvent {
    /// Feed one line; returns an event when a blank line dispatches it
    fn feed(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}
