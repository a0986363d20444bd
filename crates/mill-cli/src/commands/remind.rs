use std::sync::Arc;

use mill_config::MillConfig;
use mill_db::reminder::{ReminderScanner, ReminderSettings};

use crate::bootstrap::open_service;
use crate::cli::GlobalFlags;
use crate::notifier::LogNotifier;
use crate::output::output;

/// One scan outside the timer loop, e.g. from an external scheduler.
pub async fn handle(config: &MillConfig, flags: &GlobalFlags) -> anyhow::Result<()> {
    let service = open_service(config).await?;
    let scanner = ReminderScanner::for_service(
        &service,
        Arc::new(LogNotifier),
        ReminderSettings::from(&config.reminder),
    );

    let report = scanner.tick().await;
    service.audit().shutdown().await;
    output(&report?, flags.format)
}
