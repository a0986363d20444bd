use std::collections::BTreeMap;

use mill_config::MillConfig;
use mill_core::query::QueryParams;
use serde_json::Value;

use crate::bootstrap::open_service;
use crate::cli::GlobalFlags;
use crate::cli::root_commands::TaskListArgs;
use crate::output::output;

pub async fn handle(args: TaskListArgs, config: &MillConfig, flags: &GlobalFlags) -> anyhow::Result<()> {
    let service = open_service(config).await?;
    let deleted = args.deleted;
    let spec = service.query_spec(to_params(args))?;

    let page = if deleted {
        service.list_deleted_tasks(spec).await?
    } else {
        service.list_tasks(spec).await?
    };
    output(&page, flags.format)
}

fn to_params(args: TaskListArgs) -> QueryParams {
    let mut filters = BTreeMap::new();
    for (field, value) in [
        ("status", args.status),
        ("priority", args.priority),
        ("assignee_id", args.assignee),
        ("created_by", args.creator),
    ] {
        if let Some(value) = value {
            filters.insert(field.to_string(), Value::String(value));
        }
    }

    QueryParams {
        page: args.page,
        limit: args.limit,
        search: args.search,
        search_fields: args.search_fields,
        sort_by: args.sort_by,
        sort_order: args.order,
        start_date: args.start_date,
        end_date: args.end_date,
        filters,
        relations: Vec::new(),
        include_soft_deleted: false,
    }
}
