//! Task repository: CRUD, soft delete, relation loading, and listing through
//! the query engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mill_core::entities::{NewAttachment, NewTask, Task, TaskSummary, TaskView};
use mill_core::enums::{AuditAction, AuditScope, TaskStatus};
use mill_core::errors::CoreError;
use mill_core::query::{PageResult, Predicate, QuerySpec, QueryStore, StoreQuery, TASKS};

use crate::MillDb;
use crate::audit::AuditEvent;
use crate::error::DatabaseError;
use crate::helpers::{
    format_datetime, get_bool, get_opt_string, parse_datetime, parse_enum,
    parse_optional_datetime,
};
use crate::repos::attachment::{attachment_summary, check_files};
use crate::service::{MillService, require_text};
use crate::updates::task::{TaskUpdate, TaskUpdateBuilder};

const SELECT_COLS: &str = "id, title, description, status, priority, due_date, created_by, \
     assignee_id, reminder_sent, created_at, updated_at, deleted_at";

const LIST_RELATIONS: [&str; 4] = ["assignee", "creator", "comments", "attachments"];

fn row_to_task(row: &libsql::Row) -> Result<Task, DatabaseError> {
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: get_opt_string(row, 2)?,
        status: parse_enum(&row.get::<String>(3)?)?,
        priority: parse_enum(&row.get::<String>(4)?)?,
        due_date: parse_optional_datetime(get_opt_string(row, 5)?.as_deref())?,
        created_by: row.get(6)?,
        assignee_id: get_opt_string(row, 7)?,
        reminder_sent: get_bool(row, 8)?,
        created_at: parse_datetime(&row.get::<String>(9)?)?,
        updated_at: parse_datetime(&row.get::<String>(10)?)?,
        deleted_at: parse_optional_datetime(get_opt_string(row, 11)?.as_deref())?,
    })
}

fn opt_text(value: Option<&str>) -> libsql::Value {
    value.map_or(libsql::Value::Null, Into::into)
}

fn opt_datetime(value: Option<&DateTime<Utc>>) -> libsql::Value {
    value.map_or(libsql::Value::Null, |dt| format_datetime(dt).into())
}

impl MillDb {
    pub async fn insert_task(&self, task: &Task) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO tasks ({SELECT_COLS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                libsql::params_from_iter(vec![
                    task.id.as_str().into(),
                    task.title.as_str().into(),
                    opt_text(task.description.as_deref()),
                    task.status.as_str().into(),
                    task.priority.as_str().into(),
                    opt_datetime(task.due_date.as_ref()),
                    task.created_by.as_str().into(),
                    opt_text(task.assignee_id.as_deref()),
                    libsql::Value::Integer(i64::from(task.reminder_sent)),
                    format_datetime(&task.created_at).into(),
                    format_datetime(&task.updated_at).into(),
                    opt_datetime(task.deleted_at.as_ref()),
                ]),
            )
            .await?;
        Ok(())
    }

    /// Look up a task by id, soft-deleted ones included.
    pub async fn find_task(&self, id: &str) -> Result<Option<Task>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT {SELECT_COLS} FROM tasks WHERE id = ?1"), [id])
            .await?;
        rows.next().await?.map(|row| row_to_task(&row)).transpose()
    }

    /// A live (not soft-deleted) task.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` if the task is missing or deleted.
    pub async fn get_task(&self, id: &str) -> Result<Task, DatabaseError> {
        self.find_task(id)
            .await?
            .filter(|t| !t.is_deleted())
            .ok_or(DatabaseError::NoResult)
    }

    /// Apply `update` to a live task. Returns `false` if no live task matched.
    pub async fn apply_task_update(
        &self,
        id: &str,
        update: &TaskUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut sets = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();
        let mut idx = 1usize;

        if let Some(ref title) = update.title {
            sets.push(format!("title = ?{idx}"));
            params.push(title.as_str().into());
            idx += 1;
        }
        if let Some(ref description) = update.description {
            sets.push(format!("description = ?{idx}"));
            params.push(opt_text(description.as_deref()));
            idx += 1;
        }
        if let Some(status) = update.status {
            sets.push(format!("status = ?{idx}"));
            params.push(status.as_str().into());
            idx += 1;
        }
        if let Some(priority) = update.priority {
            sets.push(format!("priority = ?{idx}"));
            params.push(priority.as_str().into());
            idx += 1;
        }
        if let Some(ref due_date) = update.due_date {
            sets.push(format!("due_date = ?{idx}"));
            params.push(opt_datetime(due_date.as_ref()));
            idx += 1;
        }
        if let Some(ref assignee_id) = update.assignee_id {
            sets.push(format!("assignee_id = ?{idx}"));
            params.push(opt_text(assignee_id.as_deref()));
            idx += 1;
        }

        sets.push(format!("updated_at = ?{idx}"));
        params.push(format_datetime(&now).into());
        idx += 1;

        params.push(id.into());
        let sql = format!(
            "UPDATE tasks SET {} WHERE id = ?{idx} AND deleted_at IS NULL",
            sets.join(", ")
        );
        let changed = self
            .conn()
            .execute(&sql, libsql::params_from_iter(params))
            .await?;
        Ok(changed > 0)
    }

    /// Mark a live task deleted. Returns `false` if no live task matched.
    pub async fn soft_delete_task(&self, id: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let ts = format_datetime(&now);
        let changed = self
            .conn()
            .execute(
                "UPDATE tasks SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                libsql::params![ts, id],
            )
            .await?;
        Ok(changed > 0)
    }

    /// Flip the reminder flag once. Returns `false` if it was already set or
    /// the task is gone, so two writers cannot both claim the transition.
    pub async fn mark_reminder_sent(&self, id: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE tasks SET reminder_sent = 1, updated_at = ?1
                 WHERE id = ?2 AND reminder_sent = 0",
                libsql::params![format_datetime(&now), id],
            )
            .await?;
        Ok(changed > 0)
    }

    /// Attach the requested relations to each task with one query per
    /// relation kind.
    pub async fn load_task_views(
        &self,
        tasks: Vec<Task>,
        relations: &[String],
    ) -> Result<Vec<TaskView>, DatabaseError> {
        let wants = |name: &str| relations.iter().any(|r| r == name);
        if tasks.is_empty() || relations.is_empty() {
            return Ok(tasks.into_iter().map(TaskView::from).collect());
        }

        let (want_assignee, want_creator) = (wants("assignee"), wants("creator"));
        let users = if want_assignee || want_creator {
            let mut ids: Vec<&str> = Vec::new();
            for task in &tasks {
                if want_creator {
                    ids.push(&task.created_by);
                }
                if let (true, Some(a)) = (want_assignee, task.assignee_id.as_deref()) {
                    ids.push(a);
                }
            }
            ids.sort_unstable();
            ids.dedup();
            self.users_by_ids(&ids).await?
        } else {
            Default::default()
        };

        let task_ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        let mut comments = if wants("comments") {
            Some(self.comments_for_tasks(&task_ids).await?)
        } else {
            None
        };
        let mut attachments = if wants("attachments") {
            Some(self.attachments_for_tasks(&task_ids).await?)
        } else {
            None
        };

        Ok(tasks
            .into_iter()
            .map(|task| TaskView {
                assignee: want_assignee
                    .then(|| task.assignee_id.as_ref().and_then(|id| users.get(id).cloned()))
                    .flatten(),
                creator: want_creator
                    .then(|| users.get(&task.created_by).cloned())
                    .flatten(),
                comments: comments
                    .as_mut()
                    .map(|by_task| by_task.remove(&task.id).unwrap_or_default()),
                attachments: attachments
                    .as_mut()
                    .map(|by_task| by_task.remove(&task.id).unwrap_or_default()),
                task,
            })
            .collect())
    }
}

#[async_trait]
impl QueryStore<TaskView> for MillDb {
    type Error = DatabaseError;

    async fn fetch(&self, query: &StoreQuery) -> Result<(Vec<TaskView>, u64), DatabaseError> {
        let (tasks, total) = self.fetch_rows(query, SELECT_COLS, row_to_task).await?;
        let views = self.load_task_views(tasks, &query.relations).await?;
        Ok((views, total))
    }
}

fn check_relations(relations: &[&str]) -> Result<(), DatabaseError> {
    for relation in relations {
        if !TASKS.has_relation(relation) {
            return Err(CoreError::validation(format!("'{relation}' is not a relation of tasks")).into());
        }
    }
    Ok(())
}

/// The list shape always carries counts, so the collections are loaded.
fn with_list_relations(mut spec: QuerySpec) -> QuerySpec {
    for relation in LIST_RELATIONS {
        if !spec.relations.iter().any(|r| r == relation) {
            spec.relations.push(relation.to_string());
        }
    }
    spec.with_default_search_fields(TASKS.searchable)
}

impl MillService {
    /// Create a task owned by `actor`, optionally with attachment metadata.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Validation` for a blank title or an unknown
    /// creator or assignee.
    pub async fn create_task(
        &self,
        actor: &str,
        input: NewTask,
        attachments: Vec<NewAttachment>,
    ) -> Result<TaskView, DatabaseError> {
        require_text("title", &input.title)?;
        check_files(&attachments)?;
        let creator = self.ensure_user(actor).await?;
        let assignee = match input.assignee_id.as_deref() {
            Some(id) => Some(self.ensure_user(id).await?),
            None => None,
        };

        let task = Task::create(input, actor, self.clock());
        let stored = self
            .store_attachments(actor, Some(&task), &task.id, attachments)
            .await?;

        self.audit().record(
            AuditEvent::new(AuditScope::Task, &task.id, AuditAction::Created).by(actor),
        );
        if !stored.is_empty() {
            self.audit().record(
                AuditEvent::new(AuditScope::Task, &task.id, AuditAction::AttachmentAdded)
                    .by(actor)
                    .details(attachment_summary(&stored)),
            );
        }

        Ok(TaskView {
            assignee,
            creator: Some(creator),
            comments: Some(Vec::new()),
            attachments: Some(stored),
            ..TaskView::from(task)
        })
    }

    /// Fetch a live task with the named relations and record the view.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` if the task is missing or deleted,
    /// `DatabaseError::Validation` for an unknown relation.
    pub async fn get_task(
        &self,
        actor: &str,
        id: &str,
        relations: &[&str],
    ) -> Result<TaskView, DatabaseError> {
        check_relations(relations)?;
        let task = self.db().get_task(id).await?;
        let relations: Vec<String> = relations.iter().map(|r| (*r).to_string()).collect();
        let view = self
            .db()
            .load_task_views(vec![task], &relations)
            .await?
            .pop()
            .ok_or(DatabaseError::NoResult)?;

        self.audit()
            .record(AuditEvent::new(AuditScope::Task, id, AuditAction::Viewed).by(actor));
        Ok(view)
    }

    /// Apply a partial update and audit the field-level diff.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` for a missing task, and
    /// `DatabaseError::Validation` for a blank title or an unknown assignee.
    pub async fn update_task(
        &self,
        actor: &str,
        id: &str,
        update: TaskUpdate,
    ) -> Result<Task, DatabaseError> {
        let action = match update.status {
            Some(TaskStatus::Completed) => AuditAction::Completed,
            _ => AuditAction::Updated,
        };
        self.mutate_task(actor, id, update, action).await
    }

    /// # Errors
    ///
    /// Same as [`update_task`](Self::update_task).
    pub async fn update_task_status(
        &self,
        actor: &str,
        id: &str,
        status: TaskStatus,
    ) -> Result<Task, DatabaseError> {
        self.update_task(actor, id, TaskUpdateBuilder::new().status(status).build())
            .await
    }

    /// Set or clear the assignee.
    ///
    /// # Errors
    ///
    /// Same as [`update_task`](Self::update_task).
    pub async fn assign_task(
        &self,
        actor: &str,
        id: &str,
        assignee_id: Option<&str>,
    ) -> Result<Task, DatabaseError> {
        let update = TaskUpdateBuilder::new()
            .assignee_id(assignee_id.map(String::from))
            .build();
        self.mutate_task(actor, id, update, AuditAction::Assigned).await
    }

    /// Soft-delete a task. It stays readable through
    /// [`list_deleted_tasks`](Self::list_deleted_tasks).
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` if there is no live task with `id`.
    pub async fn delete_task(&self, actor: &str, id: &str) -> Result<(), DatabaseError> {
        if !self.db().soft_delete_task(id, self.clock().now()).await? {
            return Err(DatabaseError::NoResult);
        }
        self.audit()
            .record(AuditEvent::new(AuditScope::Task, id, AuditAction::Deleted).by(actor));
        Ok(())
    }

    /// Page through live tasks. Relation collections are reduced to counts.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Validation` for a spec the engine rejects.
    pub async fn list_tasks(&self, spec: QuerySpec) -> Result<PageResult<TaskSummary>, DatabaseError> {
        let spec = with_list_relations(spec);
        self.engine()
            .execute_with::<TaskView, _, _>(&spec, &TASKS, self.db(), TaskSummary::from)
            .await
    }

    /// Page through soft-deleted tasks only.
    ///
    /// # Errors
    ///
    /// Same as [`list_tasks`](Self::list_tasks).
    pub async fn list_deleted_tasks(
        &self,
        spec: QuerySpec,
    ) -> Result<PageResult<TaskSummary>, DatabaseError> {
        let spec = with_list_relations(spec).include_soft_deleted();
        let query = self
            .engine()
            .plan(&spec, &TASKS)?
            .filter(Predicate::is_not_null("deleted_at"));
        let (items, total) = QueryStore::<TaskView>::fetch(self.db(), &query).await?;
        Ok(PageResult::new(items, total, spec.page, spec.limit).map(TaskSummary::from))
    }

    /// Page through live tasks created by `user_id`.
    ///
    /// # Errors
    ///
    /// Same as [`list_tasks`](Self::list_tasks).
    pub async fn tasks_created_by(
        &self,
        user_id: &str,
        spec: QuerySpec,
    ) -> Result<PageResult<TaskSummary>, DatabaseError> {
        self.list_tasks(spec.filter("created_by", user_id)).await
    }

    async fn mutate_task(
        &self,
        actor: &str,
        id: &str,
        update: TaskUpdate,
        action: AuditAction,
    ) -> Result<Task, DatabaseError> {
        let before = self.db().get_task(id).await?;

        if let Some(ref title) = update.title {
            require_text("title", title)?;
        }
        if let Some(Some(ref assignee)) = update.assignee_id {
            self.ensure_user(assignee).await?;
        }
        if update.is_empty() {
            return Ok(before);
        }

        if !self
            .db()
            .apply_task_update(id, &update, self.clock().now())
            .await?
        {
            return Err(DatabaseError::NoResult);
        }
        let after = self.db().get_task(id).await?;

        self.audit().record(
            AuditEvent::new(AuditScope::Task, id, action)
                .by(actor)
                .snapshots(&before, &after)?,
        );
        Ok(after)
    }
}
