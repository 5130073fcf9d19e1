//! Refresh token storage.
//!
//! Tokens are stored by SHA-256 hash; the plaintext never reaches the
//! database. Revocation is a single conditional `UPDATE`, so concurrent
//! revokers of one hash are serialized by the row lock and exactly one of
//! them gets the row back.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use time::OffsetDateTime;
use uuid::Uuid;
use warden_auth::{ClientOrigin, RefreshTokenRecord};

use crate::{PgPool, StorageResult, map_insert_error};

// =============================================================================
// Types
// =============================================================================

type TokenTuple = (
    Uuid,
    String,
    Uuid,
    String,
    Uuid,
    String,
    OffsetDateTime,
    OffsetDateTime,
    Option<OffsetDateTime>,
    Option<OffsetDateTime>,
    Option<String>,
    Option<String>,
    Option<String>,
);

const COLUMNS: &str = "id, token_hash, user_id, username, session_id, access_token_id, \
     created_at, expires_at, revoked_at, last_used_at, replaced_by, ip_address, user_agent";

fn from_tuple(row: TokenTuple) -> RefreshTokenRecord {
    RefreshTokenRecord {
        id: row.0,
        token_hash: row.1,
        user_id: row.2,
        username: row.3,
        session_id: row.4,
        access_token_id: row.5,
        created_at: row.6,
        expires_at: row.7,
        revoked_at: row.8,
        last_used_at: row.9,
        replaced_by: row.10,
        origin: ClientOrigin::new(row.11, row.12),
    }
}

/// Outcome of [`RefreshTokenStorage::revoke`].
#[derive(Debug, Clone, PartialEq)]
pub enum RevokeRow {
    /// This call revoked the row.
    Revoked(RefreshTokenRecord),
    /// The row exists but was already revoked.
    AlreadyRevoked,
    /// No row has this hash.
    Missing,
}

// =============================================================================
// Refresh Token Storage
// =============================================================================

/// Refresh token storage operations.
pub struct RefreshTokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> RefreshTokenStorage<'a> {
    /// Create a new token storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find a token by its hash, revoked or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_hash(&self, token_hash: &str) -> StorageResult<Option<RefreshTokenRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM refresh_tokens WHERE token_hash = $1");
        let row: Option<TokenTuple> = query_as(&sql)
            .bind(token_hash)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(from_tuple))
    }

    /// Insert a new token.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the hash is already stored, or a database error.
    pub async fn create(&self, record: &RefreshTokenRecord) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO refresh_tokens (
                id, token_hash, user_id, username, session_id, access_token_id,
                created_at, expires_at, revoked_at, last_used_at, replaced_by,
                ip_address, user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.id)
        .bind(&record.token_hash)
        .bind(record.user_id)
        .bind(&record.username)
        .bind(record.session_id)
        .bind(&record.access_token_id)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.revoked_at)
        .bind(record.last_used_at)
        .bind(&record.replaced_by)
        .bind(&record.origin.ip_address)
        .bind(&record.origin.user_agent)
        .execute(self.pool)
        .await
        .map_err(|e| map_insert_error(e, || format!("RefreshToken {} already exists", record.id)))?;

        Ok(())
    }

    /// Revoke a token unless it is already revoked.
    ///
    /// Stamps `revoked_at`, `last_used_at` and, when rotating, `replaced_by`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn revoke(
        &self,
        token_hash: &str,
        at: OffsetDateTime,
        replaced_by: Option<&str>,
    ) -> StorageResult<RevokeRow> {
        let sql = format!(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2,
                last_used_at = $2,
                replaced_by = $3
            WHERE token_hash = $1
              AND revoked_at IS NULL
            RETURNING {COLUMNS}
            "#
        );
        let row: Option<TokenTuple> = query_as(&sql)
            .bind(token_hash)
            .bind(at)
            .bind(replaced_by)
            .fetch_optional(self.pool)
            .await?;

        if let Some(row) = row {
            return Ok(RevokeRow::Revoked(from_tuple(row)));
        }

        // Rows are never un-revoked, so a row seen here was revoked by
        // someone else.
        let exists: bool =
            query_scalar("SELECT EXISTS (SELECT 1 FROM refresh_tokens WHERE token_hash = $1)")
                .bind(token_hash)
                .fetch_one(self.pool)
                .await?;

        Ok(if exists {
            RevokeRow::AlreadyRevoked
        } else {
            RevokeRow::Missing
        })
    }

    /// Revoke every live token of a user. Returns the revoked hashes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        at: OffsetDateTime,
    ) -> StorageResult<Vec<String>> {
        let hashes: Vec<String> = query_scalar(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE user_id = $1
              AND revoked_at IS NULL
            RETURNING token_hash
            "#,
        )
        .bind(user_id)
        .bind(at)
        .fetch_all(self.pool)
        .await?;

        Ok(hashes)
    }

    /// Count live tokens for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count_active_for_user(
        &self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> StorageResult<i64> {
        let count: i64 = query_scalar(
            r#"
            SELECT COUNT(*)
            FROM refresh_tokens
            WHERE user_id = $1
              AND revoked_at IS NULL
              AND expires_at > $2
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(self.pool)
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tuple_maps_origin() {
        let now = OffsetDateTime::now_utc();
        let record = from_tuple((
            Uuid::new_v4(),
            "hash".to_string(),
            Uuid::new_v4(),
            "alice".to_string(),
            Uuid::new_v4(),
            "jti".to_string(),
            now,
            now + time::Duration::days(7),
            None,
            None,
            None,
            Some("203.0.113.7".to_string()),
            None,
        ));

        assert_eq!(record.origin.ip_address.as_deref(), Some("203.0.113.7"));
        assert!(record.origin.user_agent.is_none());
        assert!(record.is_valid_at(now));
    }

    #[test]
    fn test_column_list_matches_tuple_arity() {
        assert_eq!(COLUMNS.split(',').count(), 13);
    }
}
