use std::sync::Arc;

use anyhow::Context;
use mill_config::MillConfig;
use mill_core::clock::SystemClock;
use mill_db::service::MillService;

use crate::cli::GlobalFlags;

/// Load layered configuration (`.env`, TOML files, `TASKMILL_*`), apply
/// command-line overrides, and validate the result.
pub fn load_config(flags: &GlobalFlags) -> anyhow::Result<MillConfig> {
    let mut config =
        MillConfig::load_with_dotenv().context("failed to load taskmill configuration")?;
    apply_overrides(&mut config, flags);
    config.validate().context("invalid taskmill configuration")?;
    Ok(config)
}

fn apply_overrides(config: &mut MillConfig, flags: &GlobalFlags) {
    if let Some(path) = &flags.database {
        config.database.path.clone_from(path);
    }
}

/// Open the configured database and start its audit writer.
pub async fn open_service(config: &MillConfig) -> anyhow::Result<MillService> {
    MillService::open(config, Arc::new(SystemClock))
        .await
        .with_context(|| format!("failed to open database at {}", config.database.path))
}

#[cfg(test)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cli::OutputFormat;

    fn flags(database: Option<&str>) -> GlobalFlags {
        GlobalFlags {
            format: OutputFormat::Json,
            database: database.map(String::from),
        }
    }

    #[test]
    fn database_flag_beats_environment() {
        Jail::expect_with(|jail| {
            jail.set_env("TASKMILL_DATABASE__PATH", "from-env.db");

            let config = load_config(&flags(None)).map_err(|e| e.to_string())?;
            assert_eq!(config.database.path, "from-env.db");

            let config = load_config(&flags(Some(":memory:"))).map_err(|e| e.to_string())?;
            assert_eq!(config.database.path, ":memory:");
            Ok(())
        });
    }

    #[test]
    fn invalid_values_are_rejected_at_startup() {
        Jail::expect_with(|jail| {
            jail.set_env("TASKMILL_REMINDER__INTERVAL_SECS", "0");
            let err = load_config(&flags(None)).unwrap_err();
            assert!(format!("{err:#}").contains("reminder.interval_secs"));
            Ok(())
        });
    }
}
