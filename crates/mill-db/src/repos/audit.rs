//! Audit trail repository.
//!
//! Rows are only ever inserted; triggers in the schema reject UPDATE and
//! DELETE. Reads return newest first.

use async_trait::async_trait;

use mill_core::diff::DiffRecord;
use mill_core::entities::AuditEntry;
use mill_core::enums::AuditScope;
use mill_core::query::{AUDIT_ENTRIES, PageResult, QuerySpec, QueryStore, StoreQuery};

use crate::MillDb;
use crate::error::DatabaseError;
use crate::helpers::{format_datetime, get_opt_string, parse_datetime, parse_enum, parse_optional_json};
use crate::service::MillService;

const SELECT_COLS: &str = "id, scope, scope_id, action, performed_by, details, changes, created_at";

fn row_to_audit(row: &libsql::Row) -> Result<AuditEntry, DatabaseError> {
    Ok(AuditEntry {
        id: row.get(0)?,
        scope: parse_enum(&row.get::<String>(1)?)?,
        scope_id: row.get(2)?,
        action: parse_enum(&row.get::<String>(3)?)?,
        performed_by: get_opt_string(row, 4)?,
        details: get_opt_string(row, 5)?,
        changes: parse_optional_json::<DiffRecord>(get_opt_string(row, 6)?.as_deref())?,
        created_at: parse_datetime(&row.get::<String>(7)?)?,
    })
}

impl MillDb {
    /// Insert one entry. Only the audit writer calls this.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the changes cannot be serialized or the
    /// INSERT fails.
    pub async fn append_audit(&self, entry: &AuditEntry) -> Result<(), DatabaseError> {
        let changes = entry
            .changes
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DatabaseError::Query(format!("audit changes: {e}")))?;

        self.conn()
            .execute(
                &format!("INSERT INTO audit_entries ({SELECT_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                libsql::params![
                    entry.id.as_str(),
                    entry.scope.as_str(),
                    entry.scope_id.as_str(),
                    entry.action.as_str(),
                    entry.performed_by.as_deref(),
                    entry.details.as_deref(),
                    changes,
                    format_datetime(&entry.created_at)
                ],
            )
            .await?;
        Ok(())
    }

    /// Every entry about one subject, newest first.
    pub async fn list_audit_by_scope(
        &self,
        scope: AuditScope,
        scope_id: &str,
    ) -> Result<Vec<AuditEntry>, DatabaseError> {
        self.collect_audit(
            &format!(
                "SELECT {SELECT_COLS} FROM audit_entries
                 WHERE scope = ?1 AND scope_id = ?2
                 ORDER BY created_at DESC, id DESC"
            ),
            vec![scope.as_str().into(), scope_id.into()],
        )
        .await
    }

    /// Every entry performed by one user, newest first.
    pub async fn list_audit_by_actor(&self, user_id: &str) -> Result<Vec<AuditEntry>, DatabaseError> {
        self.collect_audit(
            &format!(
                "SELECT {SELECT_COLS} FROM audit_entries
                 WHERE performed_by = ?1
                 ORDER BY created_at DESC, id DESC"
            ),
            vec![user_id.into()],
        )
        .await
    }

    async fn collect_audit(
        &self,
        sql: &str,
        params: Vec<libsql::Value>,
    ) -> Result<Vec<AuditEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, libsql::params_from_iter(params))
            .await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(row_to_audit(&row)?);
        }
        Ok(entries)
    }
}

#[async_trait]
impl QueryStore<AuditEntry> for MillDb {
    type Error = DatabaseError;

    async fn fetch(&self, query: &StoreQuery) -> Result<(Vec<AuditEntry>, u64), DatabaseError> {
        self.fetch_rows(query, SELECT_COLS, row_to_audit).await
    }
}

impl MillService {
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_audit_by_scope(
        &self,
        scope: AuditScope,
        scope_id: &str,
    ) -> Result<Vec<AuditEntry>, DatabaseError> {
        self.db().list_audit_by_scope(scope, scope_id).await
    }

    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn list_audit_by_actor(&self, user_id: &str) -> Result<Vec<AuditEntry>, DatabaseError> {
        self.db().list_audit_by_actor(user_id).await
    }

    /// Page through the whole audit log with the usual query options.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Validation` for a spec the engine rejects.
    pub async fn list_audit(&self, spec: QuerySpec) -> Result<PageResult<AuditEntry>, DatabaseError> {
        self.engine().execute(&spec, &AUDIT_ENTRIES, self.db()).await
    }
}
