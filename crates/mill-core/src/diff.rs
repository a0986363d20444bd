//! Field-level before/after deltas between two snapshots of one entity.
//!
//! Snapshots are the `serde_json` form of an entity. Only top-level fields of
//! `after` are inspected; a field missing from `before` counts as previously
//! undefined, so it shows up as a change even when `after` holds `null`.
//! Values are compared by value, so equal timestamps or equal nested objects
//! are never reported. Nested objects and arrays are compared deeply: a
//! JSON snapshot has no object identity, so a rebuilt but equal relation is
//! not a change.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::CoreError;

/// Bookkeeping fields that never appear in a diff.
pub const DEFAULT_EXCLUDED_FIELDS: &[&str] = &["created_at", "updated_at", "deleted_at"];

/// One changed field.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FieldChange {
    pub before: Value,
    pub after: Value,
}

/// Changed fields keyed by field name. Never empty: no change is `None`.
pub type DiffRecord = BTreeMap<String, FieldChange>;

/// Diff two snapshots, skipping [`DEFAULT_EXCLUDED_FIELDS`].
#[must_use]
pub fn diff(before: &Value, after: &Value) -> Option<DiffRecord> {
    diff_excluding(before, after, DEFAULT_EXCLUDED_FIELDS)
}

/// Diff two snapshots, skipping the given field names.
///
/// Both values are expected to be JSON objects. A non-object `after` has no
/// fields and yields `None`; a non-object `before` is treated as empty.
#[must_use]
pub fn diff_excluding(before: &Value, after: &Value, exclude: &[&str]) -> Option<DiffRecord> {
    let empty = Map::new();
    let after = after.as_object()?;
    let before = before.as_object().unwrap_or(&empty);

    let changes: DiffRecord = after
        .iter()
        .filter(|(field, _)| !exclude.contains(&field.as_str()))
        .filter(|(field, value)| before.get(field.as_str()) != Some(*value))
        .map(|(field, value)| {
            (
                field.clone(),
                FieldChange {
                    before: before.get(field.as_str()).cloned().unwrap_or(Value::Null),
                    after: value.clone(),
                },
            )
        })
        .collect();

    if changes.is_empty() { None } else { Some(changes) }
}

/// Serialize two typed snapshots and diff them.
///
/// # Errors
///
/// Returns `CoreError::Other` if either value fails to serialize.
pub fn diff_entities<T: Serialize>(before: &T, after: &T) -> Result<Option<DiffRecord>, CoreError> {
    let before = serde_json::to_value(before).map_err(|e| CoreError::Other(e.into()))?;
    let after = serde_json::to_value(after).map_err(|e| CoreError::Other(e.into()))?;
    Ok(diff(&before, &after))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn status_change_is_the_only_entry() {
        let before = json!({"status": "BACKLOG", "title": "A"});
        let after = json!({"status": "COMPLETED", "title": "A"});

        let changes = diff(&before, &after).expect("status changed");
        let mut expected = DiffRecord::new();
        expected.insert(
            "status".into(),
            FieldChange {
                before: json!("BACKLOG"),
                after: json!("COMPLETED"),
            },
        );
        assert_eq!(changes, expected);
    }

    #[test]
    fn identical_snapshots_yield_none() {
        let snapshot = json!({
            "title": "A",
            "due_date": "2024-01-15T10:00:00Z",
            "tags": ["x", "y"],
            "owner": {"id": "usr-1"},
            "reminder_sent": false,
        });
        assert_eq!(diff(&snapshot, &snapshot.clone()), None);
    }

    #[test]
    fn bookkeeping_fields_are_never_reported() {
        let before = json!({
            "title": "A",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "deleted_at": null,
        });
        let after = json!({
            "title": "A",
            "created_at": "2024-02-01T00:00:00Z",
            "updated_at": "2024-02-02T00:00:00Z",
            "deleted_at": "2024-02-03T00:00:00Z",
        });
        assert_eq!(diff(&before, &after), None);
    }

    #[test]
    fn field_missing_from_before_is_a_change() {
        let before = json!({"title": "A"});
        let after = json!({"title": "A", "assignee_id": null});

        let changes = diff(&before, &after).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes["assignee_id"].before, Value::Null);
        assert_eq!(changes["assignee_id"].after, Value::Null);
    }

    #[test]
    fn nested_values_compare_by_content() {
        let before = json!({"owner": {"id": "usr-1"}, "tags": ["x"]});
        let same = json!({"owner": {"id": "usr-1"}, "tags": ["x"]});
        assert_eq!(diff(&before, &same), None);

        let moved = json!({"owner": {"id": "usr-2"}, "tags": ["x"]});
        let changes = diff(&before, &moved).unwrap();
        assert_eq!(changes.keys().collect::<Vec<_>>(), vec!["owner"]);
    }

    #[test]
    fn fields_only_in_before_are_ignored() {
        let before = json!({"title": "A", "legacy": 1});
        let after = json!({"title": "A"});
        assert_eq!(diff(&before, &after), None);
    }

    #[test]
    fn custom_exclusions_apply() {
        let before = json!({"title": "A", "status": "pending"});
        let after = json!({"title": "B", "status": "completed"});

        let changes = diff_excluding(&before, &after, &["title"]).unwrap();
        assert_eq!(changes.keys().collect::<Vec<_>>(), vec!["status"]);
    }

    #[test]
    fn non_object_after_has_no_changes() {
        assert_eq!(diff(&json!({"a": 1}), &json!("nope")), None);
    }

    #[test]
    fn typed_entities_diff_through_serde() {
        #[derive(Serialize)]
        struct Row {
            title: &'static str,
            priority: u8,
            updated_at: &'static str,
        }

        let changes = diff_entities(
            &Row { title: "A", priority: 1, updated_at: "t1" },
            &Row { title: "A", priority: 3, updated_at: "t2" },
        )
        .unwrap()
        .unwrap();
        assert_eq!(changes["priority"].after, json!(3));
        assert!(!changes.contains_key("updated_at"));
    }
}
