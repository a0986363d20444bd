//! Per-collection allow-lists for query planning.
//!
//! Only fields listed here can be sorted, filtered, searched, or loaded as
//! relations. Column names in planned queries therefore always come from
//! these constants, never from caller input.

/// Storage type of a filterable column, used to coerce filter values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    pub name: &'static str,
    pub table: &'static str,
    pub default_sort: &'static str,
    /// Column constrained by a query's date range.
    pub date_column: &'static str,
    /// Column marking soft-deleted rows, if the collection has one.
    pub soft_delete_column: Option<&'static str>,
    /// Every physical column. Stores refuse to emit any other identifier.
    pub columns: &'static [&'static str],
    pub sortable: &'static [&'static str],
    pub filterable: &'static [(&'static str, FieldKind)],
    pub searchable: &'static [&'static str],
    pub relations: &'static [&'static str],
}

impl CollectionSchema {
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }

    #[must_use]
    pub fn is_sortable(&self, field: &str) -> bool {
        self.sortable.contains(&field)
    }

    #[must_use]
    pub fn filter_kind(&self, field: &str) -> Option<FieldKind> {
        self.filterable
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, kind)| *kind)
    }

    #[must_use]
    pub fn is_searchable(&self, field: &str) -> bool {
        self.searchable.contains(&field)
    }

    #[must_use]
    pub fn has_relation(&self, relation: &str) -> bool {
        self.relations.contains(&relation)
    }
}

pub const TASKS: CollectionSchema = CollectionSchema {
    name: "tasks",
    table: "tasks",
    default_sort: "created_at",
    date_column: "created_at",
    soft_delete_column: Some("deleted_at"),
    columns: &[
        "id",
        "title",
        "description",
        "status",
        "priority",
        "due_date",
        "created_by",
        "assignee_id",
        "reminder_sent",
        "created_at",
        "updated_at",
        "deleted_at",
    ],
    sortable: &["created_at", "updated_at", "due_date", "title", "status", "priority"],
    filterable: &[
        ("status", FieldKind::Text),
        ("priority", FieldKind::Text),
        ("assignee_id", FieldKind::Text),
        ("created_by", FieldKind::Text),
        ("reminder_sent", FieldKind::Bool),
    ],
    searchable: &["title", "description"],
    relations: &["assignee", "creator", "comments", "attachments"],
};

pub const COMMENTS: CollectionSchema = CollectionSchema {
    name: "comments",
    table: "comments",
    default_sort: "created_at",
    date_column: "created_at",
    soft_delete_column: Some("deleted_at"),
    columns: &[
        "id",
        "task_id",
        "content",
        "created_by",
        "created_at",
        "updated_at",
        "deleted_at",
    ],
    sortable: &["created_at"],
    filterable: &[("task_id", FieldKind::Text), ("created_by", FieldKind::Text)],
    searchable: &["content"],
    relations: &["author"],
};

pub const AUDIT_ENTRIES: CollectionSchema = CollectionSchema {
    name: "audit entries",
    table: "audit_entries",
    default_sort: "created_at",
    date_column: "created_at",
    soft_delete_column: None,
    columns: &[
        "id",
        "scope",
        "scope_id",
        "action",
        "performed_by",
        "details",
        "changes",
        "created_at",
    ],
    sortable: &["created_at"],
    filterable: &[
        ("scope", FieldKind::Text),
        ("scope_id", FieldKind::Text),
        ("action", FieldKind::Text),
        ("performed_by", FieldKind::Text),
    ],
    searchable: &["details"],
    relations: &[],
};
