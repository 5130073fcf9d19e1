//! Persistent session repository trait.
//!
//! This is the durable source of truth for refresh token revocation. The
//! session cache may lose entries or be down entirely; this store may not.
//!
//! # Security Considerations
//!
//! - Tokens are stored as SHA-256 hashes only
//! - Revocation must be atomic: of two concurrent callers revoking the same
//!   token, exactly one observes [`RevokeOutcome::Revoked`]
//! - Expired records are removed by an external retention job

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::{PasswordResetToken, RefreshTokenRecord, SessionEndReason, UserSession};

/// Result of an atomic revocation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RevokeOutcome {
    /// This call revoked the token. Carries the now revoked record.
    Revoked(Box<RefreshTokenRecord>),
    /// The token was already revoked by someone else.
    AlreadyRevoked,
    /// No record with this hash exists.
    NotFound,
}

impl RevokeOutcome {
    /// Returns `true` if this caller won the revocation.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        matches!(self, Self::Revoked(_))
    }
}

/// Durable storage for refresh tokens, sessions and password reset tokens.
///
/// # Implementations
///
/// Implementations are provided in separate crates:
/// - `warden-auth-postgres` - PostgreSQL storage backend
#[async_trait]
pub trait PersistentSessionRepository: Send + Sync {
    /// Stores a new refresh token record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be stored (duplicate hash,
    /// storage unavailable).
    async fn create_refresh_token(&self, record: &RefreshTokenRecord) -> AuthResult<()>;

    /// Finds a refresh token record by hash, regardless of its state.
    ///
    /// Callers must check expiry and revocation themselves.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_refresh_token(&self, token_hash: &str)
    -> AuthResult<Option<RefreshTokenRecord>>;

    /// Atomically revokes a token if it is not revoked yet.
    ///
    /// Also stamps `last_used_at` and, for rotation, `replaced_by`.
    ///
    /// # Arguments
    ///
    /// * `token_hash` - Hash of the token to revoke
    /// * `at` - Revocation time
    /// * `replaced_by` - Hash of the successor when rotating
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        at: OffsetDateTime,
        replaced_by: Option<&str>,
    ) -> AuthResult<RevokeOutcome>;

    /// Revokes every unrevoked token of a user.
    ///
    /// # Returns
    ///
    /// Hashes of the tokens this call revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        at: OffsetDateTime,
    ) -> AuthResult<Vec<String>>;

    /// Stores a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create_session(&self, session: &UserSession) -> AuthResult<()>;

    /// Records activity on a session and the token now representing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn touch_session(
        &self,
        session_id: Uuid,
        current_token_hash: &str,
        at: OffsetDateTime,
    ) -> AuthResult<()>;

    /// Ends a session if it is still active.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn end_session(
        &self,
        session_id: Uuid,
        reason: SessionEndReason,
        at: OffsetDateTime,
    ) -> AuthResult<()>;

    /// Ends every active session of a user. Returns the number ended.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn end_sessions_for_user(
        &self,
        user_id: Uuid,
        reason: SessionEndReason,
        at: OffsetDateTime,
    ) -> AuthResult<u64>;

    /// Stores a new password reset token.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn create_reset_token(&self, token: &PasswordResetToken) -> AuthResult<()>;

    /// Atomically marks a reset token used.
    ///
    /// # Returns
    ///
    /// The token as consumed, or `None` if it is unknown, already used or
    /// expired at `at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        at: OffsetDateTime,
    ) -> AuthResult<Option<PasswordResetToken>>;
}
