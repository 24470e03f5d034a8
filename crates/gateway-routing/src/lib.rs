//! # Gateway Routing
//!
//! Route resolution, provider fallback and credential rotation for the AI
//! proxy gateway.
//!
//! This crate provides:
//! - Path resolution (exact, prefix, default route)
//! - Ordered provider fallback with failure isolation
//! - Credential rotation with pluggable ordering policies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod policy;
pub mod rotator;
pub mod router;

#[cfg(test)]
mod testing;

// Re-export main types
pub use policy::{RotationPolicy, RotationStrategy, RoundRobinPolicy, SequentialPolicy};
pub use rotator::CredentialRotator;
pub use router::Router;
