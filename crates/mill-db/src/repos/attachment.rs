//! Attachment metadata repository. File bytes are stored by the caller.

use std::collections::HashMap;

use mill_core::entities::{Attachment, NewAttachment, Task};
use mill_core::enums::{AuditAction, AuditScope};
use tracing::error;

use crate::MillDb;
use crate::audit::AuditEvent;
use crate::error::DatabaseError;
use crate::helpers::{format_datetime, parse_datetime, placeholders};
use crate::service::{MillService, require_text};

const SELECT_COLS: &str = "id, task_id, original_name, file_name, mime_type, file_path, \
     created_by, created_at, updated_at";

fn row_to_attachment(row: &libsql::Row) -> Result<Attachment, DatabaseError> {
    Ok(Attachment {
        id: row.get(0)?,
        task_id: row.get(1)?,
        original_name: row.get(2)?,
        file_name: row.get(3)?,
        mime_type: row.get(4)?,
        file_path: row.get(5)?,
        created_by: row.get(6)?,
        created_at: parse_datetime(&row.get::<String>(7)?)?,
        updated_at: parse_datetime(&row.get::<String>(8)?)?,
    })
}

/// Reject metadata with blank names before anything is written.
pub(crate) fn check_files(files: &[NewAttachment]) -> Result<(), DatabaseError> {
    for file in files {
        require_text("original_name", &file.original_name)?;
        require_text("file_path", &file.file_path)?;
    }
    Ok(())
}

/// Comma-separated original file names, for audit details.
pub(crate) fn attachment_summary(attachments: &[Attachment]) -> String {
    attachments
        .iter()
        .map(|a| a.original_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl MillDb {
    pub async fn insert_attachment(&self, attachment: &Attachment) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO attachments ({SELECT_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                libsql::params![
                    attachment.id.as_str(),
                    attachment.task_id.as_str(),
                    attachment.original_name.as_str(),
                    attachment.file_name.as_str(),
                    attachment.mime_type.as_str(),
                    attachment.file_path.as_str(),
                    attachment.created_by.as_str(),
                    format_datetime(&attachment.created_at),
                    format_datetime(&attachment.updated_at)
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn list_attachments_for_task(&self, task_id: &str) -> Result<Vec<Attachment>, DatabaseError> {
        Ok(self
            .attachments_for_tasks(&[task_id])
            .await?
            .remove(task_id)
            .unwrap_or_default())
    }

    /// Attachments for each task in `task_ids`, oldest first.
    pub(crate) async fn attachments_for_tasks(
        &self,
        task_ids: &[&str],
    ) -> Result<HashMap<String, Vec<Attachment>>, DatabaseError> {
        let mut by_task: HashMap<String, Vec<Attachment>> = HashMap::new();
        if task_ids.is_empty() {
            return Ok(by_task);
        }
        let sql = format!(
            "SELECT {SELECT_COLS} FROM attachments WHERE task_id IN ({})
             ORDER BY created_at ASC, id ASC",
            placeholders(1, task_ids.len())
        );
        let params: Vec<libsql::Value> = task_ids.iter().map(|id| (*id).into()).collect();
        let mut rows = self
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        while let Some(row) = rows.next().await? {
            let attachment = row_to_attachment(&row)?;
            by_task
                .entry(attachment.task_id.clone())
                .or_default()
                .push(attachment);
        }
        Ok(by_task)
    }
}

impl MillService {
    /// Record metadata for files already stored by the upload layer.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` for a missing task and
    /// `DatabaseError::Validation` for an empty batch or blank names.
    pub async fn add_attachments(
        &self,
        actor: &str,
        task_id: &str,
        files: Vec<NewAttachment>,
    ) -> Result<Vec<Attachment>, DatabaseError> {
        if files.is_empty() {
            return Err(mill_core::errors::CoreError::validation("no files to attach").into());
        }
        check_files(&files)?;
        self.db().get_task(task_id).await?;
        self.ensure_user(actor).await?;

        let stored = self.store_attachments(actor, None, task_id, files).await?;
        self.audit().record(
            AuditEvent::new(AuditScope::Task, task_id, AuditAction::Uploaded)
                .by(actor)
                .details(attachment_summary(&stored)),
        );
        Ok(stored)
    }

    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` for a missing task.
    pub async fn list_attachments(&self, actor: &str, task_id: &str) -> Result<Vec<Attachment>, DatabaseError> {
        self.db().get_task(task_id).await?;
        let attachments = self.db().list_attachments_for_task(task_id).await?;
        self.audit().record(
            AuditEvent::new(AuditScope::Task, task_id, AuditAction::Viewed)
                .by(actor)
                .details("attachments"),
        );
        Ok(attachments)
    }

    /// Insert the task (when given) and its attachment rows in one
    /// transaction. Either every row is written or none is.
    pub(crate) async fn store_attachments(
        &self,
        actor: &str,
        task: Option<&Task>,
        task_id: &str,
        files: Vec<NewAttachment>,
    ) -> Result<Vec<Attachment>, DatabaseError> {
        let _gate = self.db().write_gate().await;
        let tx = self.db().conn().transaction().await?;
        match self.insert_rows(actor, task, task_id, files).await {
            Ok(stored) => {
                tx.commit().await?;
                Ok(stored)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    error!(task_id, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn insert_rows(
        &self,
        actor: &str,
        task: Option<&Task>,
        task_id: &str,
        files: Vec<NewAttachment>,
    ) -> Result<Vec<Attachment>, DatabaseError> {
        if let Some(task) = task {
            self.db().insert_task(task).await?;
        }
        let mut stored = Vec::with_capacity(files.len());
        for file in files {
            let attachment = Attachment::create(task_id, file, actor, self.clock());
            self.db().insert_attachment(&attachment).await?;
            stored.push(attachment);
        }
        Ok(stored)
    }
}
