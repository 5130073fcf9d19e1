//! Password reset token storage.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;
use uuid::Uuid;
use warden_auth::PasswordResetToken;

use crate::{PgPool, StorageResult, map_insert_error};

type ResetTuple = (
    Uuid,
    String,
    Uuid,
    OffsetDateTime,
    OffsetDateTime,
    Option<OffsetDateTime>,
);

fn from_tuple(row: ResetTuple) -> PasswordResetToken {
    PasswordResetToken {
        id: row.0,
        token_hash: row.1,
        user_id: row.2,
        created_at: row.3,
        expires_at: row.4,
        used_at: row.5,
    }
}

/// Password reset token storage operations.
pub struct ResetTokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> ResetTokenStorage<'a> {
    /// Create a new reset token storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new reset token.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the hash exists, or a database error.
    pub async fn create(&self, token: &PasswordResetToken) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO password_reset_tokens (id, token_hash, user_id, created_at, expires_at, used_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id)
        .bind(&token.token_hash)
        .bind(token.user_id)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.used_at)
        .execute(self.pool)
        .await
        .map_err(|e| map_insert_error(e, || format!("Reset token {} already exists", token.id)))?;

        Ok(())
    }

    /// Mark a token used if it is unused and unexpired at `at`.
    ///
    /// Returns `None` when there is nothing redeemable under this hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub async fn consume(
        &self,
        token_hash: &str,
        at: OffsetDateTime,
    ) -> StorageResult<Option<PasswordResetToken>> {
        let row: Option<ResetTuple> = query_as(
            r#"
            UPDATE password_reset_tokens
            SET used_at = $2
            WHERE token_hash = $1
              AND used_at IS NULL
              AND expires_at > $2
            RETURNING id, token_hash, user_id, created_at, expires_at, used_at
            "#,
        )
        .bind(token_hash)
        .bind(at)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(from_tuple))
    }
}
