//! Route definitions for the gateway API.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{auth::auth_middleware, handlers, state::AppState};

/// Create the main API router
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/healthz", get(handlers::health_check))
        // Every other path is a chat route
        .merge(chat_routes(state.clone()))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Authenticated catch-all chat route
fn chat_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::chat_completion))
        .route("/*path", post(handlers::chat_completion))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
