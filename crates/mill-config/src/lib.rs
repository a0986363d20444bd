//! # mill-config
//!
//! Layered configuration loading for taskmill using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`TASKMILL_*` prefix, `__` as separator)
//! 2. Project-level `.taskmill/config.toml`
//! 3. User-level `~/.config/taskmill/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `TASKMILL_DATABASE__PATH` -> `database.path`,
//! `TASKMILL_REMINDER__LOOKAHEAD_MINUTES` -> `reminder.lookahead_minutes`, etc.
//! The `__` (double underscore) separates nested config sections.
//!
//! # Usage
//!
//! ```no_run
//! use mill_config::MillConfig;
//!
//! let config = MillConfig::load_with_dotenv().expect("config");
//! config.validate().expect("valid config");
//!
//! if config.reminder.enabled {
//!     println!("scanning every {}s", config.reminder.interval_secs);
//! }
//! ```

mod audit;
mod database;
mod error;
mod query;
mod reminder;

pub use audit::AuditConfig;
pub use database::{DatabaseConfig, IN_MEMORY};
pub use error::ConfigError;
pub use query::QueryConfig;
pub use reminder::ReminderConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable prefix for every setting.
pub const ENV_PREFIX: &str = "TASKMILL_";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MillConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub reminder: ReminderConfig,
}

impl MillConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy`; use [`load_with_dotenv`](Self::load_with_dotenv)
    /// if you need `.env` file loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Figment` if a source cannot be read or a value
    /// has the wrong type.
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment().extract().map_err(ConfigError::from)
    }

    /// Load configuration with `.env` file support.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can inspect the figment directly or add providers on
    /// top.
    #[must_use]
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".taskmill/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Reject values that would stall the scanner or the audit writer.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::invalid("database.path", "must not be empty"));
        }
        if self.query.default_limit == 0 {
            return Err(ConfigError::invalid("query.default_limit", "must be positive"));
        }
        if self.query.default_limit > self.query.max_limit {
            return Err(ConfigError::invalid(
                "query.default_limit",
                format!("exceeds query.max_limit ({})", self.query.max_limit),
            ));
        }
        if self.audit.queue_capacity == 0 {
            return Err(ConfigError::invalid("audit.queue_capacity", "must be positive"));
        }
        if self.reminder.interval_secs == 0 {
            return Err(ConfigError::invalid("reminder.interval_secs", "must be positive"));
        }
        if self.reminder.batch_size == 0 {
            return Err(ConfigError::invalid("reminder.batch_size", "must be positive"));
        }
        if self.reminder.concurrency == 0 {
            return Err(ConfigError::invalid("reminder.concurrency", "must be positive"));
        }
        Ok(())
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("taskmill").join("config.toml"))
    }

    /// Load `.env` from the workspace root, falling back to the current
    /// directory. Silently does nothing if no `.env` is found.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            // crate -> crates/ -> workspace root
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }

        let _ = dotenvy::dotenv();
    }
}
