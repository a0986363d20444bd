use mill_config::MillConfig;

use crate::bootstrap::open_service;
use crate::cli::GlobalFlags;
use crate::cli::root_commands::AuditArgs;
use crate::output::output;

pub async fn handle(args: &AuditArgs, config: &MillConfig, flags: &GlobalFlags) -> anyhow::Result<()> {
    let service = open_service(config).await?;

    let entries = match (args.scope, args.id.as_deref(), args.actor.as_deref()) {
        (Some(scope), Some(id), None) => service.list_audit_by_scope(scope.into(), id).await?,
        (None, None, Some(actor)) => service.list_audit_by_actor(actor).await?,
        _ => anyhow::bail!("pass either --scope with --id, or --actor"),
    };

    output(&entries, flags.format)
}
