//! Provider adapter abstraction.
//!
//! Each upstream family implements [`ProviderAdapter`]: translate the
//! canonical request into the upstream dialect, call upstream with one
//! credential, and normalize the result back into canonical form.

use crate::error::GatewayError;
use crate::request::{ChatRequest, Role};
use crate::response::ChatCompletion;
use crate::route::{Credential, ProviderConfig, ProviderFamily};
use crate::streaming::ChunkStream;
use async_trait::async_trait;

/// Outcome of a successful provider call
#[derive(Debug)]
pub enum ChatOutcome {
    /// Complete response
    Completion(ChatCompletion),
    /// Canonical SSE frame stream
    Stream(ChunkStream),
}

impl ChatOutcome {
    /// Whether this outcome is a stream
    #[must_use]
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// The completion, if not streaming
    #[must_use]
    pub fn into_completion(self) -> Option<ChatCompletion> {
        match self {
            Self::Completion(completion) => Some(completion),
            Self::Stream(_) => None,
        }
    }

    /// The stream, if streaming
    #[must_use]
    pub fn into_stream(self) -> Option<ChunkStream> {
        match self {
            Self::Stream(stream) => Some(stream),
            Self::Completion(_) => None,
        }
    }
}

/// Result of one adapter call
pub type ProviderResult = Result<ChatOutcome, GatewayError>;

/// Where a canonical role lands in an upstream dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamRole {
    /// Sent as a message with this role
    Native(&'static str),
    /// Moved out of the message list into a dedicated request field
    Lifted(&'static str),
    /// Sent under this role with the content rewritten
    Degraded(&'static str),
}

impl UpstreamRole {
    /// Upstream role or field name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Native(name) | Self::Lifted(name) | Self::Degraded(name) => name,
        }
    }
}

/// Upstream provider adapter
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Family handled by this adapter
    fn family(&self) -> ProviderFamily;

    /// Map a canonical role into this provider's dialect.
    ///
    /// Total over [`Role::ALL`].
    fn map_role(&self, role: Role) -> UpstreamRole;

    /// Perform one chat call against upstream with a single credential
    async fn chat(
        &self,
        config: &ProviderConfig,
        credential: &Credential,
        request: &ChatRequest,
    ) -> ProviderResult;
}

impl std::fmt::Debug for dyn ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("family", &self.family())
            .finish()
    }
}
