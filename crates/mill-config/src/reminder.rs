//! Due-date reminder scanner settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_enabled() -> bool {
    true
}

const fn default_interval_secs() -> u64 {
    60
}

const fn default_lookahead_minutes() -> u32 {
    15
}

const fn default_batch_size() -> u32 {
    500
}

const fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReminderConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between scanner ticks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Tasks due within this many minutes of now are reminded.
    #[serde(default = "default_lookahead_minutes")]
    pub lookahead_minutes: u32,

    /// Most tasks processed in one tick. The rest wait for the next one.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Tasks notified in parallel within a tick.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval_secs(),
            lookahead_minutes: default_lookahead_minutes(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
        }
    }
}

impl ReminderConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
