//! User session storage.
//!
//! One row per login lineage. Rows are only ever moved from active to ended.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use uuid::Uuid;
use warden_auth::{ClientOrigin, SessionEndReason, UserSession};

use crate::{PgPool, StorageError, StorageResult, map_insert_error};

type SessionTuple = (
    Uuid,
    Uuid,
    String,
    OffsetDateTime,
    OffsetDateTime,
    Option<OffsetDateTime>,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn from_tuple(row: SessionTuple) -> StorageResult<UserSession> {
    let end_reason = row
        .6
        .map(|r| r.parse::<SessionEndReason>())
        .transpose()
        .map_err(StorageError::invalid_data)?;

    Ok(UserSession {
        id: row.0,
        user_id: row.1,
        current_token_hash: row.2,
        started_at: row.3,
        last_activity_at: row.4,
        ended_at: row.5,
        end_reason,
        origin: ClientOrigin::new(row.7, row.8),
    })
}

/// Session storage operations.
pub struct SessionStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> SessionStorage<'a> {
    /// Create a new session storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find a session by its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored end reason is not
    /// recognized.
    pub async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<UserSession>> {
        let row: Option<SessionTuple> = query_as(
            r#"
            SELECT id, user_id, current_token_hash, started_at, last_activity_at,
                   ended_at, end_reason, ip_address, user_agent
            FROM user_sessions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(from_tuple).transpose()
    }

    /// Insert a new session.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the ID exists, or a database error.
    pub async fn create(&self, session: &UserSession) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO user_sessions (
                id, user_id, current_token_hash, started_at, last_activity_at,
                ended_at, end_reason, ip_address, user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.current_token_hash)
        .bind(session.started_at)
        .bind(session.last_activity_at)
        .bind(session.ended_at)
        .bind(session.end_reason.map(|r| r.as_str()))
        .bind(&session.origin.ip_address)
        .bind(&session.origin.user_agent)
        .execute(self.pool)
        .await
        .map_err(|e| map_insert_error(e, || format!("Session {} already exists", session.id)))?;

        Ok(())
    }

    /// Point an active session at its newest token.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn touch(
        &self,
        id: Uuid,
        current_token_hash: &str,
        at: OffsetDateTime,
    ) -> StorageResult<bool> {
        let result = query(
            r#"
            UPDATE user_sessions
            SET current_token_hash = $2,
                last_activity_at = $3
            WHERE id = $1
              AND ended_at IS NULL
            "#,
        )
        .bind(id)
        .bind(current_token_hash)
        .bind(at)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// End a session if it is still active.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn end(
        &self,
        id: Uuid,
        reason: SessionEndReason,
        at: OffsetDateTime,
    ) -> StorageResult<bool> {
        let result = query(
            r#"
            UPDATE user_sessions
            SET ended_at = $3,
                end_reason = $2
            WHERE id = $1
              AND ended_at IS NULL
            "#,
        )
        .bind(id)
        .bind(reason.as_str())
        .bind(at)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// End every active session of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn end_all_for_user(
        &self,
        user_id: Uuid,
        reason: SessionEndReason,
        at: OffsetDateTime,
    ) -> StorageResult<u64> {
        let result = query(
            r#"
            UPDATE user_sessions
            SET ended_at = $3,
                end_reason = $2
            WHERE user_id = $1
              AND ended_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(reason.as_str())
        .bind(at)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
