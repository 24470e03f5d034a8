//! # Gateway Core
//!
//! Core types, traits, and error handling for the AI proxy gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//! - Canonical (OpenAI-shaped) request and response types
//! - The provider adapter trait
//! - Route table and provider configuration
//! - Response normalization and the stream forwarder
//! - Error types and handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod normalizer;
pub mod provider;
pub mod request;
pub mod response;
pub mod route;
pub mod streaming;

// Re-export commonly used types
pub use error::{GatewayError, GatewayResult};
pub use normalizer::{build_response, build_stream_chunk, synthesize_tool_call_id};
pub use provider::{ChatOutcome, ProviderAdapter, ProviderResult, UpstreamRole};
pub use request::{
    ChatRequest, FunctionCall, FunctionDefinition, Message, Role, Tool, ToolCall, ToolType,
};
pub use response::{ChatCompletion, Choice, FinishReason, ResponseMessage};
pub use route::{Credential, ProviderConfig, ProviderFamily, Route, RouteTable};
pub use streaming::{
    forward_stream, ChatChunk, ChunkChoice, ChunkDelta, ChunkStream, DeltaStream, StreamDelta,
    ToolCallDelta,
};
