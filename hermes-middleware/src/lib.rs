//! hermes-middleware
//!
//! Axum [`middleware::from_fn_with_state`]-compatible layers for the Hermes
//! gateway: bearer auth (split between the chat and admin surfaces), the
//! edge sliding-window rate limiter, and chat-request logging.
//!
//! [`middleware::from_fn_with_state`]: axum::middleware::from_fn_with_state

mod auth;
mod ratelimit;
mod request_log;

pub use auth::{admin_auth, chat_auth};
pub use ratelimit::rate_limit;
pub use request_log::{log_chat_requests, ResolvedModel};
