use serde::{Deserialize, Serialize};
use serde_json::Value;

/// OpenAI-compatible chat-completion request.
///
/// Only `model` and `messages` are inspected by the gateway; every other field
/// (temperature, top_p, penalties, tool definitions, ...) is forwarded verbatim
/// and is therefore captured in `extra` rather than modeled explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Client-requested model name; rewritten to the resolved provider variant
    /// before forwarding.
    pub model: String,
    /// Chat messages, forwarded verbatim.
    pub messages: Vec<Value>,
    /// Whether the upstream should stream its response.
    #[serde(default)]
    pub stream: bool,
    /// Every other field on the request body, preserved for verbatim forwarding.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ChatCompletionRequest {
    /// Re-serialize with `model` rewritten to the resolved upstream variant,
    /// leaving every other field untouched.
    #[must_use]
    pub fn with_model(&self, resolved_model: &str) -> Value {
        let mut body = serde_json::to_value(self).unwrap_or_else(|_| Value::Object(self.extra.clone()));
        if let Value::Object(map) = &mut body {
            map.insert("model".to_string(), Value::String(resolved_model.to_string()));
        }
        body
    }
}

/// The OpenAI-compatible error envelope returned for client-facing failures.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    /// The nested error object.
    pub error: ErrorBody,
}

/// Body of [`ErrorEnvelope`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub message: String,
    /// Error category, e.g. `"invalid_request_error"`, `"rate_limit_error"`, `"upstream_error"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional machine-readable code, e.g. `"invalid_api_key"` or `"model_not_found"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorEnvelope {
    /// Build an envelope from a message, wire type, and optional code.
    #[must_use]
    pub fn new(message: impl Into<String>, kind: impl Into<String>, code: Option<&str>) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                kind: kind.into(),
                code: code.map(str::to_string),
            },
        }
    }
}
