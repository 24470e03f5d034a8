//! # Gateway Telemetry
//!
//! Observability for the AI proxy gateway.
//!
//! This crate provides:
//! - Structured logging initialization (JSON or pretty)
//! - Span helpers for routes and provider attempts

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod spans;

// Re-export main types
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingError};

#[doc(hidden)]
pub use tracing;
