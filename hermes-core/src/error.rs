//! Core algorithm error type.
//!
//! Hermes uses one error enum, [`hermes_types::HermesError`], from the core
//! algorithms all the way out to the HTTP response body: unlike the upstream
//! workspace this crate was adapted from (which keeps a rich non-serializable
//! error in its core crate and a separate `Clone + Serialize` duplicate in its
//! types crate for cross-middleware propagation), nothing here needs a
//! non-serializable error, so one shared type avoids a translation layer at
//! the crate boundary.

pub use hermes_types::HermesError;

/// Convenience alias used throughout `hermes-core`.
pub type Result<T> = std::result::Result<T, HermesError>;
