//! Wire-shape checks: serialized entities must validate against the
//! schemars-generated schema that downstream consumers are given.

use chrono::{TimeZone, Utc};
use schemars::schema_for;
use serde_json::json;

use mill_core::clock::ManualClock;
use mill_core::diff::diff_entities;
use mill_core::entities::*;
use mill_core::enums::*;
use mill_core::ids::{PREFIX_AUDIT, new_id};
use mill_core::query::{PageResult, QueryParams, QuerySpec};

fn validate_against_schema(
    schema: &serde_json::Value,
    instance: &serde_json::Value,
) -> Vec<String> {
    let validator = jsonschema::validator_for(schema).expect("schema should be valid");
    validator
        .iter_errors(instance)
        .map(|e| format!("{e}"))
        .collect()
}

macro_rules! assert_matches_schema {
    ($ty:ty, $val:expr) => {{
        let schema = serde_json::to_value(schema_for!($ty)).unwrap();
        let instance = serde_json::to_value(&$val).unwrap();
        let errors = validate_against_schema(&schema, &instance);
        assert!(
            errors.is_empty(),
            "Schema validation failed for {}: {:?}",
            stringify!($ty),
            errors
        );
    }};
}

fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap())
}

fn user(clock: &ManualClock) -> User {
    User::create(
        NewUser {
            first_name: "Grace".into(),
            last_name: "Hopper".into(),
            email: "grace@example.com".into(),
        },
        clock,
    )
}

#[test]
fn task_view_flattens_task_and_omits_unloaded_relations() {
    let clock = clock();
    let owner = user(&clock);
    let task = Task::create(NewTask::titled("Fix login"), &owner.id, &clock);
    let view = TaskView {
        creator: Some(owner),
        ..TaskView::from(task.clone())
    };

    let value = serde_json::to_value(&view).unwrap();
    assert_eq!(value["title"], "Fix login");
    assert_eq!(value["status"], "pending");
    assert!(value.get("assignee").is_none());
    assert!(value.get("comments").is_none());
    assert_eq!(value["creator"]["first_name"], "Grace");

    let recovered: TaskView = serde_json::from_value(value).unwrap();
    assert_eq!(recovered.task, task);
    assert_matches_schema!(TaskView, view);
}

#[test]
fn audit_entry_with_changes_matches_schema() {
    let clock = clock();
    let before = Task::create(NewTask::titled("Fix login"), "usr-1", &clock);
    let after = Task {
        status: TaskStatus::Completed,
        ..before.clone()
    };

    let entry = AuditEntry {
        id: new_id(PREFIX_AUDIT),
        scope: AuditScope::Task,
        scope_id: before.id.clone(),
        action: AuditAction::Completed,
        performed_by: Some("usr-1".into()),
        details: None,
        changes: diff_entities(&before, &after).unwrap(),
        created_at: Utc::now(),
    };

    let value = serde_json::to_value(&entry).unwrap();
    assert_eq!(value["scope"], "TASK");
    assert_eq!(value["action"], "COMPLETED");
    assert_eq!(
        value["changes"]["status"],
        json!({"before": "pending", "after": "completed"})
    );
    assert_matches_schema!(AuditEntry, entry);
}

#[test]
fn page_of_summaries_matches_schema() {
    let clock = clock();
    let task = Task::create(NewTask::titled("Fix login"), "usr-1", &clock);
    let comment = Comment::create(&task.id, "on it", "usr-1", &clock);
    let summary = TaskSummary::from(TaskView {
        comments: Some(vec![comment]),
        ..TaskView::from(task)
    });
    let page = PageResult::new(vec![summary], 11, 2, 5);

    assert_eq!(page.total_pages, 3);
    assert_matches_schema!(PageResult<TaskSummary>, page);
}

#[test]
fn query_params_from_json_body() {
    let params: QueryParams = serde_json::from_value(json!({
        "page": 3,
        "limit": 25,
        "search": "auth",
        "searchFields": ["title"],
        "sortOrder": "ASC",
        "start_date": "2024-01-01",
        "filters": {"priority": "high", "assignee_id": null},
        "relations": ["assignee"],
    }))
    .unwrap();

    let spec = QuerySpec::try_from(params).unwrap();
    assert_eq!(spec.offset(), 50);
    assert_eq!(spec.sort_order, SortOrder::Asc);
    assert_eq!(spec.search_fields, vec!["title".to_string()]);
    assert_eq!(spec.filters.len(), 2);
    assert!(spec.date_range.end.is_none());
}
