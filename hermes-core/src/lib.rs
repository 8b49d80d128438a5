//! hermes-core
//!
//! Core routing algorithms for the Hermes gateway: the model-alias
//! normalizer, the sliding-window rate limiter, the TTL-LRU cache, the
//! per-arm Thompson-sampling router scorer, the per-provider circuit
//! breaker, the cooldown ledger, the provider catalog and background sync
//! worker, the streaming proxy executor, the chat orchestrator, and the log
//! batcher / event bus that fan outcome signals out to observability.
//!
//! Nothing in this crate knows about HTTP routing, SQL, or bearer-key
//! verification — those live in `hermes-db`, `hermes-middleware`, and the
//! `hermes` binary crate. This crate's public traits ([`dispatcher::ProviderView`],
//! [`proxy::OutcomeSink`], [`proxy::ResyncTrigger`], [`catalog::ProviderStore`])
//! are the seams those outer layers implement; cooldown, breaker, and scorer
//! are concrete types passed in directly, since nothing depends back on them.
#![warn(missing_docs)]

/// Per-provider three-state circuit breaker.
pub mod breaker;
/// Provider catalog CRUD hooks and the background model-sync worker.
pub mod catalog;
/// Environment-driven process configuration.
pub mod config;
/// Cooldown ledger: exponential backoff per `(provider_id, model)`.
pub mod cooldown;
/// Dispatcher: candidate filtering, availability checks, and scoring.
pub mod dispatcher;
/// Unified core error type (re-exported from `hermes-types`).
pub mod error;
/// Log batcher and real-time server-sent-events bus.
pub mod logbus;
/// Pure model-identifier canonicalization and alias-map construction.
pub mod normalizer;
/// Chat-completion retry loop wrapping the dispatcher and proxy executor.
pub mod orchestrator;
/// Streaming-aware proxy executor: forwards requests, signals outcomes.
pub mod proxy;
/// Sliding-window rate limiter used at the ingress edge.
pub mod ratelimit;
/// Adaptive Thompson-sampling router scorer.
pub mod scorer;
/// Internal stream-handle utilities (graceful-stop / abort-on-drop).
pub mod stream;
/// TTL+LRU cache used to back provider/model reads.
pub mod ttl_lru;

pub use error::Result;
pub use stream::StreamHandle;
