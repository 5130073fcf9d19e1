//! User storage.
//!
//! Users carry their roles and extra claims alongside an Argon2 password
//! hash. The hash never leaves this crate.

use std::collections::BTreeMap;

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use uuid::Uuid;
use warden_auth::Principal;

use crate::{PgPool, StorageResult, map_insert_error};

type UserTuple = (Uuid, String, Option<String>, Vec<String>, serde_json::Value);

fn from_tuple(row: UserTuple) -> StorageResult<Principal> {
    let claims: BTreeMap<String, String> = serde_json::from_value(row.4)?;
    Ok(Principal {
        user_id: row.0,
        username: row.1,
        email: row.2,
        roles: row.3,
        claims,
    })
}

/// User storage operations.
pub struct UserStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> UserStorage<'a> {
    /// Create a new user storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find a user by login name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored claims are not a
    /// string map.
    pub async fn find_by_username(&self, username: &str) -> StorageResult<Option<Principal>> {
        let row: Option<UserTuple> = query_as(
            "SELECT id, username, email, roles, claims FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(self.pool)
        .await?;

        row.map(from_tuple).transpose()
    }

    /// Find a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored claims are not a
    /// string map.
    pub async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<Principal>> {
        let row: Option<UserTuple> =
            query_as("SELECT id, username, email, roles, claims FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        row.map(from_tuple).transpose()
    }

    /// Stored password hash for a login name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn password_hash(&self, username: &str) -> StorageResult<Option<String>> {
        let hash: Option<String> =
            query_scalar("SELECT password_hash FROM users WHERE username = $1")
                .bind(username)
                .fetch_optional(self.pool)
                .await?;

        Ok(hash)
    }

    /// Insert a user with an already hashed password.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the ID or username exists, or a database error.
    pub async fn create(&self, principal: &Principal, password_hash: &str) -> StorageResult<()> {
        let claims = serde_json::to_value(&principal.claims)?;
        query(
            r#"
            INSERT INTO users (id, username, email, roles, claims, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(principal.user_id)
        .bind(&principal.username)
        .bind(&principal.email)
        .bind(&principal.roles)
        .bind(&claims)
        .bind(password_hash)
        .execute(self.pool)
        .await
        .map_err(|e| map_insert_error(e, || format!("User '{}' already exists", principal.username)))?;

        Ok(())
    }

    /// Replace a user's password hash.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user does not exist, or a database error.
    pub async fn set_password_hash(&self, id: Uuid, password_hash: &str) -> StorageResult<()> {
        let result = query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(crate::StorageError::not_found(format!("User {id}")));
        }
        Ok(())
    }
}
