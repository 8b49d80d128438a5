//! Edge rate limiting: the first layer a request passes through (§2, §4.8),
//! keyed by client IP so it applies before the bearer token is even read.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hermes_core::ratelimit::SlidingWindowLimiter;
use hermes_types::ErrorEnvelope;

fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Reject requests once the caller's sliding window is exhausted, otherwise
/// forward, setting standard `X-RateLimit-*` response headers either way.
pub async fn rate_limit(State(limiter): State<Arc<SlidingWindowLimiter>>, request: Request, next: Next) -> Response {
    let key = client_key(&request);
    let decision = limiter.check(&key);

    if !decision.allowed {
        let body = ErrorEnvelope::new(
            "rate limit exceeded, please retry later",
            "rate_limit_error",
            None,
        );
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&decision.retry_after_ms.to_string()) {
            response.headers_mut().insert("Retry-After-Ms", value);
        }
        return response;
    }

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&decision.limit.to_string()) {
        response.headers_mut().insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        response.headers_mut().insert("X-RateLimit-Remaining", value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    fn app(limiter: Arc<SlidingWindowLimiter>) -> Router {
        Router::new()
            .route("/", get(ok_handler))
            .layer(axum::middleware::from_fn_with_state(limiter, rate_limit))
    }

    #[tokio::test]
    async fn allows_requests_under_the_limit() {
        let limiter = Arc::new(SlidingWindowLimiter::new(2, 60, 12));
        let response = app(limiter)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn denies_once_the_limit_is_exhausted() {
        let limiter = Arc::new(SlidingWindowLimiter::new(1, 60, 12));
        let router = app(limiter);
        let first = router
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
