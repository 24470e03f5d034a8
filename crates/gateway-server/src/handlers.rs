//! HTTP request handlers for the gateway API.

use axum::{
    body::Body,
    extract::{OriginalUri, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use gateway_core::{ChatOutcome, ChatRequest, ChunkStream};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

use crate::{
    error::ApiError,
    extractors::{JsonBody, RequestId},
    state::AppState,
};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Version
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Number of configured routes
    pub routes: usize,
}

/// Liveness endpoint; never requires auth
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        routes: state.router.routes().len(),
    })
}

/// Proxy a chat completion; the full request path selects the route
#[instrument(skip_all, fields(request_id = %request_id, path = %uri.path()))]
pub async fn chat_completion(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    RequestId(request_id): RequestId,
    JsonBody(request): JsonBody<ChatRequest>,
) -> Result<Response, ApiError> {
    request.validate()?;

    let path = uri.path();
    let start = Instant::now();

    debug!(
        advisory_model = ?request.model,
        messages = request.messages.len(),
        tools = request.has_tools(),
        streaming = request.stream,
        "Processing chat completion request"
    );

    match state.router.execute_with_fallback(path, &request).await {
        Ok(ChatOutcome::Completion(completion)) => {
            info!(
                model = %completion.model,
                duration_ms = start.elapsed().as_millis(),
                "Chat completion successful"
            );
            Ok(Json(completion).into_response())
        }
        Ok(ChatOutcome::Stream(stream)) => {
            info!(
                duration_ms = start.elapsed().as_millis(),
                "Streaming chat completion started"
            );
            Ok(sse_response(stream))
        }
        Err(err) => {
            error!(
                error = %err,
                status = err.status_code(),
                duration_ms = start.elapsed().as_millis(),
                "Chat completion failed"
            );
            Err(err.into())
        }
    }
}

/// Wrap a canonical frame stream as an SSE response body
fn sse_response(stream: ChunkStream) -> Response {
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
