//! User repository.

use std::collections::HashMap;

use mill_core::entities::{NewUser, User};
use mill_core::enums::{AuditAction, AuditScope};
use mill_core::errors::CoreError;

use crate::MillDb;
use crate::audit::AuditEvent;
use crate::error::DatabaseError;
use crate::helpers::{format_datetime, parse_datetime, placeholders};
use crate::service::{MillService, require_text};

const SELECT_COLS: &str = "id, first_name, last_name, email, created_at, updated_at";

fn row_to_user(row: &libsql::Row) -> Result<User, DatabaseError> {
    Ok(User {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        created_at: parse_datetime(&row.get::<String>(4)?)?,
        updated_at: parse_datetime(&row.get::<String>(5)?)?,
    })
}

impl MillDb {
    pub async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO users ({SELECT_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                libsql::params![
                    user.id.as_str(),
                    user.first_name.as_str(),
                    user.last_name.as_str(),
                    user.email.as_str(),
                    format_datetime(&user.created_at),
                    format_datetime(&user.updated_at)
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn find_user(&self, id: &str) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT {SELECT_COLS} FROM users WHERE id = ?1"), [id])
            .await?;
        rows.next().await?.map(|row| row_to_user(&row)).transpose()
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM users WHERE email = ?1"),
                [email],
            )
            .await?;
        rows.next().await?.map(|row| row_to_user(&row)).transpose()
    }

    /// Load every user in `ids` in one round trip, keyed by id. Unknown ids
    /// are absent from the map.
    pub(crate) async fn users_by_ids(
        &self,
        ids: &[&str],
    ) -> Result<HashMap<String, User>, DatabaseError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT {SELECT_COLS} FROM users WHERE id IN ({})",
            placeholders(1, ids.len())
        );
        let params: Vec<libsql::Value> = ids.iter().map(|id| (*id).into()).collect();
        let mut rows = self
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;

        let mut users = HashMap::with_capacity(ids.len());
        while let Some(row) = rows.next().await? {
            let user = row_to_user(&row)?;
            users.insert(user.id.clone(), user);
        }
        Ok(users)
    }
}

impl MillService {
    /// Register a user. Emails are unique.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Validation` for blank fields or a taken email.
    pub async fn create_user(&self, input: NewUser) -> Result<User, DatabaseError> {
        require_text("first_name", &input.first_name)?;
        require_text("last_name", &input.last_name)?;
        require_text("email", &input.email)?;
        if self.db().find_user_by_email(&input.email).await?.is_some() {
            return Err(
                CoreError::validation(format!("email {} is already registered", input.email))
                    .into(),
            );
        }

        let user = User::create(input, self.clock());
        self.db().insert_user(&user).await?;

        self.audit()
            .record(AuditEvent::new(AuditScope::User, &user.id, AuditAction::Created));
        Ok(user)
    }

    /// # Errors
    ///
    /// Returns `DatabaseError::NoResult` if no user has this id.
    pub async fn get_user(&self, id: &str) -> Result<User, DatabaseError> {
        self.db().find_user(id).await?.ok_or(DatabaseError::NoResult)
    }

    /// Fail with a validation error unless `id` names an existing user.
    pub(crate) async fn ensure_user(&self, id: &str) -> Result<User, DatabaseError> {
        self.db().find_user(id).await?.ok_or_else(|| {
            CoreError::NotFound {
                entity_type: "user".into(),
                id: id.to_string(),
            }
            .into()
        })
    }
}
