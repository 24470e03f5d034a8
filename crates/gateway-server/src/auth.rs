//! Proxy-token authentication.
//!
//! Callers present `Authorization: Bearer <token>`. Tokens are stored as
//! SHA-256 digests and compared digest-to-digest without early exit.
//! With no token configured every request is let through.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{error::ApiError, state::AppState};

type TokenDigest = [u8; 32];

/// Accepted proxy tokens
#[derive(Clone, Default)]
pub struct ProxyAuth {
    digests: Vec<TokenDigest>,
}

impl ProxyAuth {
    /// Build from plaintext tokens; empty tokens are ignored
    pub fn new<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            digests: tokens
                .into_iter()
                .filter(|token| !token.is_empty())
                .map(digest)
                .collect(),
        }
    }

    /// Authentication disabled
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether requests must carry a token
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.digests.is_empty()
    }

    /// Check a presented token
    #[must_use]
    pub fn verify(&self, token: &str) -> bool {
        let presented = digest(token);
        self.digests
            .iter()
            .fold(false, |matched, known| matched | digests_equal(known, &presented))
    }
}

impl std::fmt::Debug for ProxyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyAuth")
            .field("tokens", &self.digests.len())
            .finish()
    }
}

fn digest(token: &str) -> TokenDigest {
    Sha256::digest(token.as_bytes()).into()
}

fn digests_equal(a: &TokenDigest, b: &TokenDigest) -> bool {
    a.iter().zip(b.iter()).fold(0_u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Extract the bearer token from a request
fn bearer_token(request: &Request) -> Result<&str, ApiError> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    let value = value
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid Authorization header"))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            ApiError::unauthorized("Invalid Authorization format. Expected: Bearer <token>")
        })
}

/// Reject requests without a valid proxy token
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.auth.is_enabled() {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    match bearer_token(&request).map(|token| state.auth.verify(token)) {
        Ok(true) => {
            debug!(path = %path, "Proxy token accepted");
            next.run(request).await
        }
        Ok(false) => {
            warn!(path = %path, "Invalid proxy token");
            ApiError::unauthorized("Invalid proxy token").into_response()
        }
        Err(err) => {
            warn!(path = %path, error = %err.message, "Authentication failed");
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_verify() {
        let auth = ProxyAuth::new(["alpha", "beta"]);
        assert!(auth.is_enabled());
        assert!(auth.verify("alpha"));
        assert!(auth.verify("beta"));
        assert!(!auth.verify("gamma"));
        assert!(!auth.verify(""));
    }

    #[test]
    fn test_empty_tokens_disable_auth() {
        assert!(!ProxyAuth::new([""]).is_enabled());
        assert!(!ProxyAuth::disabled().is_enabled());
    }

    #[test]
    fn test_debug_hides_tokens() {
        let auth = ProxyAuth::new(["super-secret"]);
        let debug = format!("{auth:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("tokens: 1"));
    }

    #[test]
    fn test_bearer_token_parsing() {
        let request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer  abc ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request).unwrap(), "abc");

        let request = Request::builder()
            .header(header::AUTHORIZATION, "Basic abc")
            .body(Body::empty())
            .unwrap();
        assert!(bearer_token(&request).is_err());

        let request = Request::builder().body(Body::empty()).unwrap();
        let err = bearer_token(&request).unwrap_err();
        assert!(err.message.contains("Missing"));
    }
}
