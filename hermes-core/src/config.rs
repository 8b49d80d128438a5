//! Environment-driven configuration, loaded once into an immutable value at
//! process start.

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Error produced while loading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable was present but could not be parsed as the
    /// expected type.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Environment variable name.
        key: &'static str,
        /// The value that failed to parse.
        value: String,
    },
}

/// Process-wide configuration, read from the environment at startup.
///
/// Dispatcher/cache/rate-limit tunables set here are the *bootstrap* defaults;
/// a subset may be overridden at runtime through the `settings` table (see
/// `hermes_types::Settings`), read through the config service at call time.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port.
    pub port: u16,
    /// SQLite database file path.
    pub db_path: String,
    /// Bearer key clients must present to `/v1/*` endpoints.
    pub hermes_secret: String,
    /// TTL for provider cache entries.
    pub cache_ttl_providers: Duration,
    /// TTL for `/v1/models` listing cache entries.
    pub cache_ttl_models: Duration,
    /// Maximum entries per named cache.
    pub cache_max_size: usize,
    /// Circuit breaker: consecutive failures before opening.
    pub circuit_failure_threshold: u32,
    /// Circuit breaker: time before an open breaker allows a half-open probe.
    pub circuit_recovery_timeout: Duration,
    /// Log batcher: queue size that triggers an immediate flush.
    pub log_batch_size: usize,
    /// Log batcher: periodic flush interval regardless of queue size.
    pub log_flush_interval: Duration,
    /// Rate limiter: maximum requests allowed per window per key.
    pub rate_limit_max: u64,
    /// Rate limiter: window length.
    pub rate_limit_window: Duration,
}

impl Config {
    /// Load configuration from the process environment, applying documented
    /// defaults for anything unset. `.env` loading (if desired) is the
    /// caller's responsibility, via `dotenvy::dotenv()` before this is called.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: parse_env("PORT", 8000)?,
            db_path: env::var("DB_PATH").unwrap_or_else(|_| "hermes.db".to_string()),
            hermes_secret: env::var("HERMES_SECRET").unwrap_or_else(|_| "changeme".to_string()),
            cache_ttl_providers: Duration::from_secs(parse_env("CACHE_TTL_PROVIDERS", 30)?),
            cache_ttl_models: Duration::from_secs(parse_env("CACHE_TTL_MODELS", 60)?),
            cache_max_size: parse_env("CACHE_MAX_SIZE", 100)?,
            circuit_failure_threshold: parse_env("CIRCUIT_FAILURE_THRESHOLD", 5)?,
            circuit_recovery_timeout: Duration::from_secs(parse_env("CIRCUIT_RECOVERY_TIMEOUT", 30)?),
            log_batch_size: parse_env("LOG_BATCH_SIZE", 50)?,
            log_flush_interval: Duration::from_secs(parse_env("LOG_FLUSH_INTERVAL", 5)?),
            rate_limit_max: parse_env("RATE_LIMIT_MAX", 60)?,
            rate_limit_window: Duration::from_secs(parse_env("RATE_LIMIT_WINDOW", 60)?),
        })
    }
}

fn parse_env<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(key) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_value_is_reported_with_the_offending_key() {
        // SAFETY: test-only, single-threaded access to the process environment.
        unsafe {
            env::set_var("CACHE_MAX_SIZE", "not-a-number");
        }
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "CACHE_MAX_SIZE", .. }));
        unsafe {
            env::remove_var("CACHE_MAX_SIZE");
        }
    }
}
