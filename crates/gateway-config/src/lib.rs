//! # Gateway Config
//!
//! Configuration loading and validation for the AI proxy gateway.
//!
//! This crate provides:
//! - YAML, TOML and JSON configuration files
//! - Environment overrides and `${VAR}` expansion for secrets
//! - Validation and conversion into the immutable route table

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod loader;

// Re-export main types
pub use config::{AuthConfig, GatewayConfig, ProviderEntry, RouteConfig, ServerConfig};
pub use error::ConfigError;
pub use loader::{ConfigFormat, ConfigLoader};
