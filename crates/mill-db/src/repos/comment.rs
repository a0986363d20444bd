//! Comment repository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mill_core::entities::{Comment, CommentView};
use mill_core::enums::{AuditAction, AuditScope, SortOrder};
use mill_core::query::{COMMENTS, PageResult, QuerySpec, QueryStore, StoreQuery};

use crate::MillDb;
use crate::audit::AuditEvent;
use crate::error::DatabaseError;
use crate::helpers::{format_datetime, get_opt_string, parse_datetime, parse_optional_datetime, placeholders};
use crate::service::{MillService, require_text};

const SELECT_COLS: &str = "id, task_id, content, created_by, created_at, updated_at, deleted_at";

fn row_to_comment(row: &libsql::Row) -> Result<Comment, DatabaseError> {
    Ok(Comment {
        id: row.get(0)?,
        task_id: row.get(1)?,
        content: row.get(2)?,
        created_by: row.get(3)?,
        created_at: parse_datetime(&row.get::<String>(4)?)?,
        updated_at: parse_datetime(&row.get::<String>(5)?)?,
        deleted_at: parse_optional_datetime(get_opt_string(row, 6)?.as_deref())?,
    })
}

impl MillDb {
    pub async fn insert_comment(&self, comment: &Comment) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO comments ({SELECT_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                libsql::params![
                    comment.id.as_str(),
                    comment.task_id.as_str(),
                    comment.content.as_str(),
                    comment.created_by.as_str(),
                    format_datetime(&comment.created_at),
                    format_datetime(&comment.updated_at),
                    comment.deleted_at.as_ref().map(format_datetime)
                ],
            )
            .await?;
        Ok(())
    }

    /// A live comment.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` if the comment is missing or deleted.
    pub async fn get_comment(&self, id: &str) -> Result<Comment, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM comments WHERE id = ?1 AND deleted_at IS NULL"),
                [id],
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        row_to_comment(&row)
    }

    pub async fn soft_delete_comment(&self, id: &str, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE comments SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
                libsql::params![format_datetime(&now), id],
            )
            .await?;
        Ok(changed > 0)
    }

    /// Live comments for each task in `task_ids`, oldest first.
    pub(crate) async fn comments_for_tasks(
        &self,
        task_ids: &[&str],
    ) -> Result<HashMap<String, Vec<Comment>>, DatabaseError> {
        let mut by_task: HashMap<String, Vec<Comment>> = HashMap::new();
        if task_ids.is_empty() {
            return Ok(by_task);
        }
        let sql = format!(
            "SELECT {SELECT_COLS} FROM comments
             WHERE task_id IN ({}) AND deleted_at IS NULL
             ORDER BY created_at ASC, id ASC",
            placeholders(1, task_ids.len())
        );
        let params: Vec<libsql::Value> = task_ids.iter().map(|id| (*id).into()).collect();
        let mut rows = self
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        while let Some(row) = rows.next().await? {
            let comment = row_to_comment(&row)?;
            by_task.entry(comment.task_id.clone()).or_default().push(comment);
        }
        Ok(by_task)
    }
}

#[async_trait]
impl QueryStore<CommentView> for MillDb {
    type Error = DatabaseError;

    async fn fetch(&self, query: &StoreQuery) -> Result<(Vec<CommentView>, u64), DatabaseError> {
        let (comments, total) = self.fetch_rows(query, SELECT_COLS, row_to_comment).await?;
        if !query.wants("author") {
            return Ok((comments.into_iter().map(CommentView::from).collect(), total));
        }

        let mut ids: Vec<&str> = comments.iter().map(|c| c.created_by.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        let authors = self.users_by_ids(&ids).await?;
        let views = comments
            .into_iter()
            .map(|comment| CommentView {
                author: authors.get(&comment.created_by).cloned(),
                comment,
            })
            .collect();
        Ok((views, total))
    }
}

impl MillService {
    /// Add a comment to a live task. Audited against the task.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` for a missing task and
    /// `DatabaseError::Validation` for blank content or an unknown author.
    pub async fn add_comment(
        &self,
        actor: &str,
        task_id: &str,
        content: &str,
    ) -> Result<CommentView, DatabaseError> {
        require_text("content", content)?;
        self.db().get_task(task_id).await?;
        let author = self.ensure_user(actor).await?;

        let comment = Comment::create(task_id, content, actor, self.clock());
        self.db().insert_comment(&comment).await?;
        self.audit().record(
            AuditEvent::new(AuditScope::Task, task_id, AuditAction::Commented)
                .by(actor)
                .details(comment.id.as_str()),
        );
        Ok(CommentView {
            comment,
            author: Some(author),
        })
    }

    /// Page through a task's live comments, oldest first unless the spec
    /// sorts otherwise. Authors are always loaded.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` for a missing task and
    /// `DatabaseError::Validation` for a spec the engine rejects.
    pub async fn list_comments(
        &self,
        actor: &str,
        task_id: &str,
        mut spec: QuerySpec,
    ) -> Result<PageResult<CommentView>, DatabaseError> {
        self.db().get_task(task_id).await?;
        spec.filters.retain(|f| f.field != "task_id");
        if spec.sort_by.is_none() {
            spec = spec.sort_by("created_at", SortOrder::Asc);
        }
        if !spec.relations.iter().any(|r| r == "author") {
            spec = spec.with_relation("author");
        }
        let spec = spec
            .filter("task_id", task_id)
            .with_default_search_fields(COMMENTS.searchable);

        let page = self.engine().execute(&spec, &COMMENTS, self.db()).await?;
        self.audit().record(
            AuditEvent::new(AuditScope::Task, task_id, AuditAction::Viewed)
                .by(actor)
                .details("comments"),
        );
        Ok(page)
    }

    /// Soft-delete a comment.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` if there is no live comment with `id`.
    pub async fn delete_comment(&self, actor: &str, id: &str) -> Result<(), DatabaseError> {
        let comment = self.db().get_comment(id).await?;
        if !self.db().soft_delete_comment(id, self.clock().now()).await? {
            return Err(DatabaseError::NoResult);
        }
        self.audit().record(
            AuditEvent::new(AuditScope::Comment, id, AuditAction::Deleted)
                .by(actor)
                .details(comment.task_id),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use mill_core::entities::NewTask;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_support::helpers::{new_user, test_service};

    #[tokio::test]
    async fn comments_list_oldest_first_with_authors() {
        let (svc, clock) = crate::test_support::helpers::test_service_with_manual_clock().await;
        let ada = svc.create_user(new_user("Ada", "ada@example.com")).await.unwrap();
        let bob = svc.create_user(new_user("Bob", "bob@example.com")).await.unwrap();
        let task = svc
            .create_task(&ada.id, NewTask::titled("Discuss"), Vec::new())
            .await
            .unwrap()
            .task;

        svc.add_comment(&ada.id, &task.id, "first").await.unwrap();
        clock.advance(chrono::Duration::seconds(1));
        svc.add_comment(&bob.id, &task.id, "second").await.unwrap();

        let page = svc.list_comments(&ada.id, &task.id, QuerySpec::new()).await.unwrap();
        assert_eq!(page.total, 2);
        let contents: Vec<&str> = page.items.iter().map(|c| c.comment.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert_eq!(page.items[1].author.as_ref().unwrap().id, bob.id);
    }

    #[tokio::test]
    async fn comment_is_audited_against_its_task() {
        let svc = test_service().await;
        let ada = svc.create_user(new_user("Ada", "ada@example.com")).await.unwrap();
        let task = svc
            .create_task(&ada.id, NewTask::titled("Discuss"), Vec::new())
            .await
            .unwrap()
            .task;

        let view = svc.add_comment(&ada.id, &task.id, "noted").await.unwrap();
        svc.audit().flush().await.unwrap();

        let trail = svc.list_audit_by_scope(AuditScope::Task, &task.id).await.unwrap();
        assert_eq!(trail[0].action, AuditAction::Commented);
        assert_eq!(trail[0].details.as_deref(), Some(view.comment.id.as_str()));
    }

    #[tokio::test]
    async fn deleted_comment_drops_out_of_listing() {
        let svc = test_service().await;
        let ada = svc.create_user(new_user("Ada", "ada@example.com")).await.unwrap();
        let task = svc
            .create_task(&ada.id, NewTask::titled("Discuss"), Vec::new())
            .await
            .unwrap()
            .task;
        let view = svc.add_comment(&ada.id, &task.id, "oops").await.unwrap();

        svc.delete_comment(&ada.id, &view.comment.id).await.unwrap();
        assert!(matches!(
            svc.delete_comment(&ada.id, &view.comment.id).await,
            Err(DatabaseError::NoResult)
        ));

        let page = svc.list_comments(&ada.id, &task.id, QuerySpec::new()).await.unwrap();
        assert_eq!(page.total, 0);

        svc.audit().flush().await.unwrap();
        let trail = svc
            .list_audit_by_scope(AuditScope::Comment, &view.comment.id)
            .await
            .unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::Deleted);
    }

    #[tokio::test]
    async fn blank_comment_is_rejected() {
        let svc = test_service().await;
        let ada = svc.create_user(new_user("Ada", "ada@example.com")).await.unwrap();
        let task = svc
            .create_task(&ada.id, NewTask::titled("Discuss"), Vec::new())
            .await
            .unwrap()
            .task;
        assert!(svc.add_comment(&ada.id, &task.id, "  ").await.unwrap_err().is_validation());
    }
}
