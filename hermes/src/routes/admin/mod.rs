//! The `/admin/*` surface: provider/key/settings management, cooldown and
//! breaker inspection, cache control, log browsing, and the live event feed.
//! Every route here sits behind [`hermes_middleware::admin_auth`].

mod breakers;
mod cache;
mod cooldowns;
mod events;
mod keys;
mod logs;
mod providers;
mod settings;

use axum::routing::{delete, get, post, put};
use axum::Router;
use hermes_middleware::admin_auth;

use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/providers", get(providers::list).post(providers::create))
        .route("/providers/:id", put(providers::update).delete(providers::delete))
        .route("/providers/:id/resync", post(providers::resync))
        .route("/providers/import", post(providers::import))
        .route("/providers/export", get(providers::export))
        .route("/keys", get(keys::list).post(keys::create))
        .route("/keys/:id", delete(keys::delete))
        .route("/settings", get(settings::list).put(settings::update))
        .route("/cooldowns", get(cooldowns::list))
        .route("/cooldowns/:provider_id/:model", delete(cooldowns::clear))
        .route("/circuit-breakers", get(breakers::list))
        .route("/circuit-breakers/:key/reset", post(breakers::reset))
        .route("/cache/stats", get(cache::stats))
        .route("/cache/clear", post(cache::clear))
        .route("/logs/requests", get(logs::requests))
        .route("/logs/sync", get(logs::sync))
        .route("/events", get(events::stream))
        .layer(axum::middleware::from_fn_with_state(
            std::sync::Arc::new(state.config.hermes_secret.clone()),
            admin_auth,
        ))
}
