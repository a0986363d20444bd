use std::sync::Arc;

use anyhow::Context;
use mill_config::MillConfig;
use mill_db::reminder::{ReminderScanner, ReminderSettings};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bootstrap::open_service;
use crate::cli::root_commands::RunArgs;
use crate::notifier::LogNotifier;

/// Serve until Ctrl-C. On shutdown the scanner finishes its current tick,
/// then the audit writer drains its queue.
pub async fn handle(args: &RunArgs, config: &MillConfig) -> anyhow::Result<()> {
    let service = open_service(config).await?;
    let cancel = CancellationToken::new();

    let scanner = if config.reminder.enabled && !args.no_reminders {
        let scanner = ReminderScanner::for_service(
            &service,
            Arc::new(LogNotifier),
            ReminderSettings::from(&config.reminder),
        );
        let token = cancel.clone();
        Some(tokio::spawn(async move { scanner.run(token).await }))
    } else {
        info!("reminder scanner disabled");
        None
    };

    info!(database = %config.database.path, "taskmill running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("shutting down");
    cancel.cancel();
    if let Some(handle) = scanner {
        if let Err(e) = handle.await {
            error!(error = %e, "reminder scanner task failed");
        }
    }

    service.audit().shutdown().await;
    let stats = service.audit().stats();
    info!(
        written = stats.written,
        failed = stats.failed,
        dropped = stats.dropped,
        "audit writer drained"
    );
    Ok(())
}
