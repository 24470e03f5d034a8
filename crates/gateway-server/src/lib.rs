//! # Gateway Server
//!
//! HTTP server for the AI proxy gateway.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - Catch-all chat completion endpoint routed by request path
//! - JSON and SSE responses in the OpenAI schema
//! - Proxy-token authentication
//! - Graceful shutdown handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod state;

// Re-export main types
pub use auth::{auth_middleware, ProxyAuth};
pub use error::ApiError;
pub use handlers::HealthResponse;
pub use routes::create_router;
pub use server::{Server, ServerError};
pub use shutdown::shutdown_signal;
pub use state::AppState;
