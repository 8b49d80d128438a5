use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the Hermes workspace.
///
/// Wraps client-input problems, upstream provider failures, gateway-capacity
/// rejections, and an aggregate for multi-provider retry attempts. Carries
/// enough structure for the HTTP layer to render the OpenAI-compatible error
/// envelope without re-deriving the reason string.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HermesError {
    /// Invalid input argument (malformed payload, unknown field, bad config value).
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// A resource could not be found (provider, key, model family).
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing resource, e.g. "provider abc123".
        what: String,
    },

    /// No provider currently hosts a variant of the requested model family.
    #[error("model not found: {model}")]
    ModelNotFound {
        /// The model name requested by the client.
        model: String,
    },

    /// An individual provider returned a non-2xx response or a decode error.
    #[error("{provider} failed: {msg}")]
    Provider {
        /// Provider name that failed.
        provider: String,
        /// Human-readable error message.
        msg: String,
    },

    /// An individual provider call exceeded the configured timeout.
    #[error("provider timed out: {provider}")]
    ProviderTimeout {
        /// Provider name that timed out.
        provider: String,
    },

    /// Every eligible provider failed or timed out for this request.
    #[error("all providers failed: {0:?}")]
    AllProvidersFailed(Vec<HermesError>),

    /// The caller's bearer key did not match any issued key.
    #[error("invalid api key")]
    InvalidApiKey,

    /// The request rate exceeds the configured rate limit for this key.
    #[error("rate limit exceeded: retry_after_ms={retry_after_ms}")]
    RateLimitExceeded {
        /// Milliseconds until the caller may retry.
        retry_after_ms: u64,
    },

    /// The circuit for a provider is open; calls are rejected until recovery.
    #[error("circuit open: {key}, retry_after_ms={retry_after_ms}")]
    CircuitOpen {
        /// The breaker key, e.g. `provider:<id>`.
        key: String,
        /// Milliseconds until the breaker allows a half-open probe.
        retry_after_ms: u64,
    },

    /// Unknown/opaque error (DB failure, cache init failure, internal bug).
    #[error("internal error: {0}")]
    Internal(String),
}

impl HermesError {
    /// Build a `NotFound` error for a description of the missing resource.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Build a `Provider` error with the provider name and message.
    pub fn provider(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            msg: msg.into(),
        }
    }

    /// Build a `ProviderTimeout` error.
    pub fn provider_timeout(provider: impl Into<String>) -> Self {
        Self::ProviderTimeout {
            provider: provider.into(),
        }
    }

    /// Flatten nested `AllProvidersFailed` structures into a plain vector.
    #[must_use]
    pub fn flatten(self) -> Vec<Self> {
        match self {
            Self::AllProvidersFailed(list) => list.into_iter().flat_map(Self::flatten).collect(),
            other => vec![other],
        }
    }

    /// The OpenAI-compatible `type` field for this error's wire representation.
    #[must_use]
    pub fn wire_type(&self) -> &'static str {
        match self {
            Self::InvalidArg(_) | Self::ModelNotFound { .. } | Self::NotFound { .. } => {
                "invalid_request_error"
            }
            Self::InvalidApiKey => "invalid_request_error",
            Self::RateLimitExceeded { .. } => "rate_limit_error",
            Self::Provider { .. }
            | Self::ProviderTimeout { .. }
            | Self::AllProvidersFailed(_)
            | Self::CircuitOpen { .. } => "upstream_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// The OpenAI-compatible `code` field, when one applies.
    #[must_use]
    pub fn wire_code(&self) -> Option<&'static str> {
        match self {
            Self::InvalidApiKey => Some("invalid_api_key"),
            Self::ModelNotFound { .. } => Some("model_not_found"),
            _ => None,
        }
    }
}
