//! Router assembly: the chat surface (rate-limited, key-authed, logged), the
//! unauthenticated health check, and the secret-gated admin surface.

mod admin;
mod chat;
mod health;

use axum::routing::get;
use axum::Router;
use hermes_middleware::{chat_auth, log_chat_requests, rate_limit};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the complete application router for the given state.
pub fn build_router(state: AppState) -> Router {
    let chat = Router::new()
        .route("/v1/chat/completions", axum::routing::post(chat::completions))
        .route("/v1/models", get(chat::list_models))
        // Innermost first: log sees the resolved model the handler records,
        // auth runs before that, and the edge rate limiter runs before auth.
        .layer(axum::middleware::from_fn_with_state(state.log_bus.clone(), log_chat_requests))
        .layer(axum::middleware::from_fn_with_state(state.stores.keys.clone(), chat_auth))
        .layer(axum::middleware::from_fn_with_state(state.limiter.clone(), rate_limit));

    let health = Router::new().route("/health", get(health::health));

    let admin = Router::new().nest("/admin", admin::router(&state));

    Router::new()
        .merge(chat)
        .merge(health)
        .merge(admin)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
