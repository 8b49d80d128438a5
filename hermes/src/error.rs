//! HTTP-layer error mapping (§4.12).
//!
//! `hermes-core`/`hermes-types` own [`HermesError`] itself; only its
//! translation into a status code and one of the two wire envelopes belongs
//! to the binary crate. [`ChatError`] renders the OpenAI-compatible
//! `{error: {message, type, code}}` body used by `/v1/*`; [`AdminError`]
//! renders the `{success, error}` body used by `/admin/*`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hermes_types::{AdminErrorEnvelope, ErrorEnvelope, HermesError};

fn status_for(err: &HermesError) -> StatusCode {
    match err {
        HermesError::InvalidArg(_) => StatusCode::BAD_REQUEST,
        HermesError::NotFound { .. } | HermesError::ModelNotFound { .. } => StatusCode::NOT_FOUND,
        HermesError::InvalidApiKey => StatusCode::UNAUTHORIZED,
        HermesError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        HermesError::Provider { .. }
        | HermesError::ProviderTimeout { .. }
        | HermesError::AllProvidersFailed(_)
        | HermesError::CircuitOpen { .. } => StatusCode::BAD_GATEWAY,
        HermesError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Chat-API error response: the OpenAI-compatible envelope.
pub struct ChatError(pub HermesError);

impl From<HermesError> for ChatError {
    fn from(err: HermesError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        if matches!(self.0, HermesError::Internal(_)) {
            tracing::error!(error = %self.0, "internal error serving chat request");
        }
        let status = status_for(&self.0);
        let body = ErrorEnvelope::new(self.0.to_string(), self.0.wire_type(), self.0.wire_code());
        (status, Json(body)).into_response()
    }
}

/// Admin-API error response: `{success: false, error: <message>}`.
pub struct AdminError(pub HermesError);

impl From<HermesError> for AdminError {
    fn from(err: HermesError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        if matches!(self.0, HermesError::Internal(_)) {
            tracing::error!(error = %self.0, "internal error serving admin request");
        }
        let status = status_for(&self.0);
        (status, Json(AdminErrorEnvelope::from_error(&self.0))).into_response()
    }
}
