use serde::{Deserialize, Serialize};

/// Dispatcher cooldown/penalty tunables, overridable at runtime via the `settings` table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DispatcherSettings {
    /// Minimum backoff applied to a first-time penalty, in milliseconds.
    pub initial_penalty_ms: u64,
    /// Ceiling on cooldown backoff, in milliseconds.
    pub max_penalty_ms: u64,
    /// Number of penalties before a background catalog resync is triggered.
    pub resync_threshold: u32,
    /// Minimum interval between resync triggers for the same provider, in milliseconds.
    pub resync_cooldown_ms: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            initial_penalty_ms: 30 * 60 * 1000,
            max_penalty_ms: 4 * 60 * 60 * 1000,
            resync_threshold: 3,
            resync_cooldown_ms: 10 * 60 * 1000,
        }
    }
}

/// Runtime-tunable settings, persisted in the `settings` table and cached in-process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Settings {
    /// Hours between full periodic catalog resyncs.
    pub periodic_sync_interval_hours: u64,
    /// Maximum chat-completion retry attempts across distinct providers.
    pub chat_max_retries: u32,
    /// Dispatcher cooldown/penalty tunables.
    pub dispatcher: DispatcherSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            periodic_sync_interval_hours: 1,
            chat_max_retries: 3,
            dispatcher: DispatcherSettings::default(),
        }
    }
}

/// A single settings key/value pair, as stored and as exposed over the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingEntry {
    /// Setting key, e.g. `"chatMaxRetries"`.
    pub key: String,
    /// Raw string value as persisted.
    pub value: String,
}
