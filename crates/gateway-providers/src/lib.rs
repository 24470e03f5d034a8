//! # Gateway Providers
//!
//! Provider adapters for the AI proxy gateway.
//!
//! Each adapter translates the canonical request into one upstream dialect
//! and normalizes the upstream result back:
//! - Cloudflare Workers AI (binding injected; REST binding included)
//! - OpenAI and OpenAI-compatible APIs
//! - Anthropic Messages API
//! - Google Gemini

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod registry;
pub mod sse;
pub mod workers_ai;

// Re-export main types
pub use anthropic::AnthropicAdapter;
pub use google::GoogleAdapter;
pub use openai::OpenAiAdapter;
pub use registry::ProviderRegistry;
pub use sse::{build_http_client, SseEvent, SseStream};
pub use workers_ai::{
    RestBinding, WorkersAiAdapter, WorkersAiBinding, WorkersAiInput, WorkersAiMessage,
    WorkersAiOutput, WorkersAiTool,
};
