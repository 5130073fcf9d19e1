//! Arc-owning storage adapters for the `warden-auth` traits.
//!
//! These adapters wrap the lifetime-based storage types and own an
//! `Arc<PgPool>`, so they can be handed to the orchestrator as
//! `Arc<dyn PersistentSessionRepository>` and friends.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;
use warden_auth::{
    AuthError, AuthResult, CredentialVerifier, PasswordResetToken, PersistentSessionRepository,
    Principal, PrincipalStorage, RefreshTokenRecord, RevokeOutcome, SessionEndReason, UserSession,
};

use crate::password::{hash_password, verify_password};
use crate::refresh_token::{RefreshTokenStorage, RevokeRow};
use crate::reset_token::ResetTokenStorage;
use crate::session::SessionStorage;
use crate::user::UserStorage;
use crate::{PgPool, StorageError, StorageResult};

// Only an unreachable database counts as a store outage; bad rows, conflicts
// and hash failures are internal errors the orchestrator must not fall back on.
fn storage_err(e: StorageError) -> AuthError {
    if e.is_connectivity_error() {
        AuthError::storage(e.to_string())
    } else {
        AuthError::internal(e.to_string())
    }
}

// =============================================================================
// Session Repository
// =============================================================================

/// PostgreSQL [`PersistentSessionRepository`].
#[derive(Clone)]
pub struct PostgresSessionRepository {
    pool: Arc<PgPool>,
}

impl PostgresSessionRepository {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistentSessionRepository for PostgresSessionRepository {
    async fn create_refresh_token(&self, record: &RefreshTokenRecord) -> AuthResult<()> {
        RefreshTokenStorage::new(&self.pool)
            .create(record)
            .await
            .map_err(storage_err)
    }

    async fn find_refresh_token(&self, token_hash: &str) -> AuthResult<Option<RefreshTokenRecord>> {
        RefreshTokenStorage::new(&self.pool)
            .find_by_hash(token_hash)
            .await
            .map_err(storage_err)
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        at: OffsetDateTime,
        replaced_by: Option<&str>,
    ) -> AuthResult<RevokeOutcome> {
        let row = RefreshTokenStorage::new(&self.pool)
            .revoke(token_hash, at, replaced_by)
            .await
            .map_err(storage_err)?;

        Ok(match row {
            RevokeRow::Revoked(record) => RevokeOutcome::Revoked(Box::new(record)),
            RevokeRow::AlreadyRevoked => RevokeOutcome::AlreadyRevoked,
            RevokeRow::Missing => RevokeOutcome::NotFound,
        })
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        at: OffsetDateTime,
    ) -> AuthResult<Vec<String>> {
        RefreshTokenStorage::new(&self.pool)
            .revoke_all_for_user(user_id, at)
            .await
            .map_err(storage_err)
    }

    async fn create_session(&self, session: &UserSession) -> AuthResult<()> {
        SessionStorage::new(&self.pool)
            .create(session)
            .await
            .map_err(storage_err)
    }

    async fn touch_session(
        &self,
        session_id: Uuid,
        current_token_hash: &str,
        at: OffsetDateTime,
    ) -> AuthResult<()> {
        let touched = SessionStorage::new(&self.pool)
            .touch(session_id, current_token_hash, at)
            .await
            .map_err(storage_err)?;
        if !touched {
            debug!(session_id = %session_id, "No active session to touch");
        }
        Ok(())
    }

    async fn end_session(
        &self,
        session_id: Uuid,
        reason: SessionEndReason,
        at: OffsetDateTime,
    ) -> AuthResult<()> {
        SessionStorage::new(&self.pool)
            .end(session_id, reason, at)
            .await
            .map(|_| ())
            .map_err(storage_err)
    }

    async fn end_sessions_for_user(
        &self,
        user_id: Uuid,
        reason: SessionEndReason,
        at: OffsetDateTime,
    ) -> AuthResult<u64> {
        SessionStorage::new(&self.pool)
            .end_all_for_user(user_id, reason, at)
            .await
            .map_err(storage_err)
    }

    async fn create_reset_token(&self, token: &PasswordResetToken) -> AuthResult<()> {
        ResetTokenStorage::new(&self.pool)
            .create(token)
            .await
            .map_err(storage_err)
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        at: OffsetDateTime,
    ) -> AuthResult<Option<PasswordResetToken>> {
        ResetTokenStorage::new(&self.pool)
            .consume(token_hash, at)
            .await
            .map_err(storage_err)
    }
}

// =============================================================================
// Principal Storage
// =============================================================================

/// PostgreSQL [`PrincipalStorage`] over the `users` table.
#[derive(Clone)]
pub struct PostgresPrincipalStorage {
    pool: Arc<PgPool>,
}

impl PostgresPrincipalStorage {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalStorage for PostgresPrincipalStorage {
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<Principal>> {
        UserStorage::new(&self.pool)
            .find_by_username(username)
            .await
            .map_err(storage_err)
    }

    async fn find_by_id(&self, user_id: Uuid) -> AuthResult<Option<Principal>> {
        UserStorage::new(&self.pool)
            .find_by_id(user_id)
            .await
            .map_err(storage_err)
    }
}

// =============================================================================
// Credential Verifier
// =============================================================================

/// [`CredentialVerifier`] checking Argon2 hashes from the `users` table.
///
/// Unknown users are verified against a throwaway hash so both rejections
/// cost the same.
#[derive(Clone)]
pub struct Argon2CredentialVerifier {
    pool: Arc<PgPool>,
    dummy_hash: Arc<str>,
}

impl Argon2CredentialVerifier {
    /// # Errors
    ///
    /// Returns an error if the throwaway hash cannot be computed.
    pub fn new(pool: Arc<PgPool>) -> StorageResult<Self> {
        let dummy_hash = hash_password(&Uuid::new_v4().to_string())?;
        Ok(Self {
            pool,
            dummy_hash: dummy_hash.into(),
        })
    }
}

#[async_trait]
impl CredentialVerifier for Argon2CredentialVerifier {
    async fn validate_user(&self, username: &str, password: &str) -> AuthResult<bool> {
        let stored = UserStorage::new(&self.pool)
            .password_hash(username)
            .await
            .map_err(storage_err)?;

        let known = stored.is_some();
        let hash = stored.unwrap_or_else(|| self.dummy_hash.to_string());
        let password = password.to_string();

        // Argon2 is deliberately slow; keep it off the async workers.
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AuthError::internal(format!("password verification task failed: {e}")))?
            .map_err(storage_err)?;

        Ok(known && matches)
    }
}

impl std::fmt::Debug for Argon2CredentialVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2CredentialVerifier").finish_non_exhaustive()
    }
}
