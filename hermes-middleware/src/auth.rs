//! Bearer-auth extractors: one path for the chat API (issued Hermes keys,
//! verified against their stored hash), one for the admin API (the single
//! `HERMES_SECRET` configured at startup).

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hermes_db::KeyRepository;
use hermes_types::{AdminErrorEnvelope, ErrorEnvelope};

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn invalid_chat_key() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorEnvelope::new(
            "invalid Hermes key provided",
            "invalid_request_error",
            Some("invalid_api_key"),
        )),
    )
        .into_response()
}

fn invalid_admin_secret() -> Response {
    (StatusCode::UNAUTHORIZED, Json(AdminErrorEnvelope::from_error("unauthorized"))).into_response()
}

/// Verify `/v1/*` requests against issued, hashed-at-rest Hermes keys.
pub async fn chat_auth(
    State(keys): State<Arc<KeyRepository>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return invalid_chat_key();
    };
    if !keys.verify(token).await {
        return invalid_chat_key();
    }
    next.run(request).await
}

/// Constant-time compare against the startup `HERMES_SECRET`, guarding `/admin/*`.
///
/// # Panics
/// Never panics in practice; `subtle`-style constant time comparison is done
/// byte-by-byte without early return.
pub async fn admin_auth(State(secret): State<Arc<String>>, request: Request, next: Next) -> Response {
    let Some(token) = bearer_token(&request) else {
        return invalid_admin_secret();
    };
    if !constant_time_eq(token.as_bytes(), secret.as_bytes()) {
        return invalid_admin_secret();
    }
    next.run(request).await
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_slices() {
        assert!(constant_time_eq(b"hk-abc", b"hk-abc"));
    }

    #[test]
    fn constant_time_eq_rejects_mismatched_length() {
        assert!(!constant_time_eq(b"hk-abc", b"hk-ab"));
    }

    #[test]
    fn constant_time_eq_rejects_differing_content() {
        assert!(!constant_time_eq(b"hk-abc", b"hk-abd"));
    }

    #[test]
    fn bearer_token_requires_the_bearer_prefix() {
        let mut request = Request::builder().body(axum::body::Body::empty()).unwrap();
        request
            .headers_mut()
            .insert(axum::http::header::AUTHORIZATION, "Basic xyz".parse().unwrap());
        assert!(bearer_token(&request).is_none());
    }

    #[test]
    fn bearer_token_extracts_the_token_after_the_prefix() {
        let mut request = Request::builder().body(axum::body::Body::empty()).unwrap();
        request
            .headers_mut()
            .insert(axum::http::header::AUTHORIZATION, "Bearer hk-abc".parse().unwrap());
        assert_eq!(bearer_token(&request), Some("hk-abc"));
    }
}
