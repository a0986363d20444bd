use mill_config::MillConfig;

use crate::cli::{Commands, GlobalFlags};

/// Dispatch a parsed command to its handler.
pub async fn dispatch(
    command: Commands,
    config: &MillConfig,
    flags: &GlobalFlags,
) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => super::run::handle(&args, config).await,
        Commands::Remind => super::remind::handle(config, flags).await,
        Commands::Tasks(args) => super::tasks::handle(args, config, flags).await,
        Commands::Audit(args) => super::audit::handle(&args, config, flags).await,
        Commands::Config => super::config::handle(config, flags),
    }
}
