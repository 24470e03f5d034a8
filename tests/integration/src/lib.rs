//! Integration tests for the AI proxy gateway
//!
//! The gateway runs on a real socket with providers pointed at wiremock
//! upstreams, covering:
//! - credential rotation and provider fallback
//! - normalization of Anthropic and Workers AI replies
//! - streaming
//! - proxy authentication

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items
pub use fixtures::*;
pub use helpers::*;

#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod workers_tests;
