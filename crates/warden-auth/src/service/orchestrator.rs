//! Authentication flow orchestration.
//!
//! [`AuthOrchestrator`] coordinates the [`TokenIssuer`], the
//! [`SessionStore`] cache and the [`PersistentSessionRepository`]:
//!
//! - **Login**: verify credentials, issue tokens, write the refresh record to
//!   the persistent store and the cache
//! - **Refresh**: resolve the record (cache first, persistent store on miss),
//!   revoke it and mint a successor (single-use rotation)
//! - **Logout**: revoke in the persistent store and leave a tombstone in the
//!   cache; idempotent
//! - **GetClaims**: principal lookup, cache first
//!
//! # Failure semantics
//!
//! A fault in one store is logged and the flow continues on the other. Only
//! when neither store can answer does a flow return
//! [`AuthError::ServiceUnavailable`]; it is never reported as
//! `Unauthenticated`.
//!
//! # Rotation arbitration
//!
//! The cache gives no cross-operation atomicity, so two concurrent refreshes
//! of the same token are arbitrated by
//! [`PersistentSessionRepository::revoke_refresh_token`]: only the caller that
//! observes [`RevokeOutcome::Revoked`] mints a successor. While the persistent
//! store is unreachable no token is rotated and Refresh is retryable.
//!
//! # Cancellation
//!
//! Dropping a flow future stops it at the next store call. Every record is
//! written by a single call with all of its fields populated, so a cancelled
//! flow never leaves a partially written record behind.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_cache::SessionStore;

use super::keys::SessionKeys;
use super::results::{LoginResult, LogoutResult, RefreshResult};
use crate::AuthResult;
use crate::config::AuthConfig;
use crate::error::{AuthError, UnauthenticatedReason};
use crate::storage::{
    CredentialVerifier, PersistentSessionRepository, PrincipalStorage, RevokeOutcome,
};
use crate::token::TokenIssuer;
use crate::token::opaque::{generate_token, hash_prefix, hash_token};
use crate::types::{
    CachedRefreshToken, ClientOrigin, PasswordResetToken, Principal, RefreshTokenRecord,
    SessionEndReason, UserInfo, UserSession,
};

/// Orchestrator settings that are not owned by the token issuer.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Cache lifetime of principals loaded by `get_claims`.
    pub principal_ttl: Duration,
    /// Lifetime of password reset tokens.
    pub password_reset_lifetime: Duration,
    /// Cache key prefix.
    pub key_prefix: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            principal_ttl: Duration::from_secs(300),
            password_reset_lifetime: Duration::from_secs(30 * 60),
            key_prefix: "warden".to_string(),
        }
    }
}

impl OrchestratorConfig {
    #[must_use]
    pub fn from_auth_config(config: &AuthConfig) -> Self {
        Self {
            principal_ttl: config.session_cache.principal_ttl,
            password_reset_lifetime: config.tokens.password_reset_lifetime,
            key_prefix: config.session_cache.key_prefix.clone(),
        }
    }
}

/// Coordinates the login, refresh, logout and claims flows.
pub struct AuthOrchestrator {
    issuer: Arc<TokenIssuer>,
    cache: Arc<SessionStore>,
    repository: Arc<dyn PersistentSessionRepository>,
    principals: Arc<dyn PrincipalStorage>,
    verifier: Arc<dyn CredentialVerifier>,
    keys: SessionKeys,
    config: OrchestratorConfig,
}

fn unauthenticated(reason: UnauthenticatedReason) -> AuthError {
    AuthError::unauthenticated(reason)
}

fn both_stores_down(flow: &str) -> AuthError {
    AuthError::service_unavailable(format!(
        "{flow}: session cache and persistent store both unavailable"
    ))
}

// Storage faults mean the store is down; anything else is a real error and
// passes through unchanged.
fn store_failure(e: AuthError, outage: impl FnOnce() -> AuthError) -> AuthError {
    if e.is_storage() { outage() } else { e }
}

// Redis expiry has one-second granularity; keep tombstones alive at least that long.
fn at_least_one_second(ttl: Duration) -> Duration {
    ttl.max(Duration::from_secs(1))
}

impl AuthOrchestrator {
    pub fn new(
        issuer: Arc<TokenIssuer>,
        cache: Arc<SessionStore>,
        repository: Arc<dyn PersistentSessionRepository>,
        principals: Arc<dyn PrincipalStorage>,
        verifier: Arc<dyn CredentialVerifier>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            keys: SessionKeys::new(config.key_prefix.clone()),
            issuer,
            cache,
            repository,
            principals,
            verifier,
            config,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    // ========================================================================
    // Login
    // ========================================================================

    /// Authenticates a user and opens a new session.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` for unknown users and wrong passwords alike
    /// - `ServiceUnavailable` if credentials could not be checked or the
    ///   refresh record could not be written to either store
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        origin: ClientOrigin,
    ) -> AuthResult<LoginResult> {
        let verified = self
            .verifier
            .validate_user(username, password)
            .await
            .map_err(|e| {
                warn!(error = %e, "Credential verification failed");
                store_failure(e, || {
                    AuthError::service_unavailable("credential store unavailable")
                })
            })?;
        if !verified {
            info!(reason = %UnauthenticatedReason::InvalidCredentials, "Login rejected");
            return Err(unauthenticated(UnauthenticatedReason::InvalidCredentials));
        }

        let principal = match self.principals.find_by_username(username).await {
            Ok(Some(principal)) => principal,
            Ok(None) => {
                warn!("Verifier accepted credentials for a user without a principal");
                return Err(unauthenticated(UnauthenticatedReason::InvalidCredentials));
            }
            Err(e) => {
                warn!(error = %e, "Principal lookup failed during login");
                return Err(store_failure(e, || {
                    AuthError::service_unavailable("principal store unavailable")
                }));
            }
        };

        let now = OffsetDateTime::now_utc();
        let access = self.issuer.generate_access_token_at(&principal, now)?;
        let refresh_token = self.issuer.generate_refresh_token();
        let record = RefreshTokenRecord::new(
            hash_token(&refresh_token),
            principal.user_id,
            principal.username.clone(),
            Uuid::new_v4(),
            access.claims.jti.clone(),
            now,
            self.issuer.refresh_expiry_from(now),
            origin.clone(),
        );

        let persisted = self.persist_record(&record).await;
        let cached = self.cache_record(&record, now).await;
        if !persisted && !cached {
            return Err(both_stores_down("login"));
        }

        if persisted {
            let session = UserSession::start(
                record.session_id,
                principal.user_id,
                record.token_hash.clone(),
                now,
                origin,
            );
            if let Err(e) = self.repository.create_session(&session).await {
                warn!(session_id = %session.id, error = %e, "Failed to record session");
            }
        }

        self.cache
            .set(
                &self.keys.principal(principal.user_id),
                &principal,
                self.config.principal_ttl,
            )
            .await;

        info!(
            user_id = %principal.user_id,
            session_id = %record.session_id,
            persisted,
            cached,
            "User logged in"
        );

        Ok(LoginResult {
            access_token: access.token,
            refresh_token,
            expires_at: access.expires_at,
            user: UserInfo::from(&principal),
        })
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Exchanges a refresh token for a new access token and a new refresh
    /// token. The presented token is revoked.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` if the token is unknown, expired, revoked or
    ///   already rotated
    /// - `ServiceUnavailable` if neither store can resolve the token, or the
    ///   persistent store cannot arbitrate the rotation
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshResult> {
        let now = OffsetDateTime::now_utc();
        let token_hash = hash_token(refresh_token);
        let key = self.keys.refresh(&token_hash);

        let record = self.resolve_refresh_record(&token_hash, &key, now).await?;
        if record.is_revoked() {
            self.write_tombstone(&key, now, record.remaining_lifetime(now))
                .await;
            return Err(unauthenticated(UnauthenticatedReason::RevokedToken));
        }
        if record.is_expired_at(now) {
            self.cache.remove(&key).await;
            return Err(unauthenticated(UnauthenticatedReason::ExpiredToken));
        }

        let principal = self.get_claims(record.user_id).await?;
        let access = self.issuer.generate_access_token_at(&principal, now)?;
        let next_token = self.issuer.generate_refresh_token();
        let next_hash = hash_token(&next_token);

        self.claim_for_rotation(&record, &key, &next_hash, now)
            .await?;

        let successor = record.successor(next_hash, access.claims.jti.clone(), now);
        let persisted = self.persist_record(&successor).await;
        let cached = self.cache_record(&successor, now).await;
        self.write_tombstone(&key, now, record.remaining_lifetime(now))
            .await;
        if !persisted && !cached {
            return Err(both_stores_down("refresh"));
        }

        if persisted
            && let Err(e) = self
                .repository
                .touch_session(record.session_id, &successor.token_hash, now)
                .await
        {
            debug!(session_id = %record.session_id, error = %e, "Failed to touch session");
        }

        info!(
            user_id = %record.user_id,
            session_id = %record.session_id,
            token = hash_prefix(&token_hash),
            "Refresh token rotated"
        );

        Ok(RefreshResult {
            access_token: access.token,
            refresh_token: Some(next_token),
            expires_at: access.expires_at,
        })
    }

    /// Finds the record for `token_hash`: cache first, then the persistent
    /// store, warming the cache on the way back.
    async fn resolve_refresh_record(
        &self,
        token_hash: &str,
        key: &str,
        now: OffsetDateTime,
    ) -> AuthResult<RefreshTokenRecord> {
        match self.cache.get::<CachedRefreshToken>(key).await {
            Some(CachedRefreshToken::Revoked { .. }) => {
                debug!(token = hash_prefix(token_hash), "Refresh token tombstoned in cache");
                return Err(unauthenticated(UnauthenticatedReason::RevokedToken));
            }
            Some(CachedRefreshToken::Active(record)) => return Ok(record),
            None => {}
        }

        match self.repository.find_refresh_token(token_hash).await {
            Ok(Some(record)) => {
                if record.is_valid_at(now) {
                    self.cache_record(&record, now).await;
                }
                Ok(record)
            }
            Ok(None) => Err(unauthenticated(UnauthenticatedReason::UnknownToken)),
            Err(e) => {
                warn!(
                    token = hash_prefix(token_hash),
                    cache_available = self.cache.is_available(),
                    error = %e,
                    "Persistent store lookup failed after cache miss"
                );
                Err(store_failure(e, || both_stores_down("refresh")))
            }
        }
    }

    /// Wins the right to rotate `record`, or fails.
    async fn claim_for_rotation(
        &self,
        record: &RefreshTokenRecord,
        key: &str,
        next_hash: &str,
        now: OffsetDateTime,
    ) -> AuthResult<()> {
        let outcome = self
            .repository
            .revoke_refresh_token(&record.token_hash, now, Some(next_hash))
            .await;

        let outcome = match outcome {
            Ok(RevokeOutcome::NotFound) => {
                // Written while the persistent store was down; backfill it so
                // the database can arbitrate.
                if let Err(e) = self.repository.create_refresh_token(record).await {
                    debug!(token = hash_prefix(&record.token_hash), error = %e, "Backfill failed");
                }
                self.repository
                    .revoke_refresh_token(&record.token_hash, now, Some(next_hash))
                    .await
            }
            other => other,
        };

        match outcome {
            Ok(RevokeOutcome::Revoked(_)) => Ok(()),
            Ok(RevokeOutcome::AlreadyRevoked) => {
                warn!(
                    user_id = %record.user_id,
                    session_id = %record.session_id,
                    token = hash_prefix(&record.token_hash),
                    "Refresh token reuse detected"
                );
                self.write_tombstone(key, now, record.remaining_lifetime(now))
                    .await;
                Err(unauthenticated(UnauthenticatedReason::RevokedToken))
            }
            Ok(RevokeOutcome::NotFound) => {
                Err(unauthenticated(UnauthenticatedReason::UnknownToken))
            }
            Err(e) => {
                warn!(
                    token = hash_prefix(&record.token_hash),
                    error = %e,
                    "Persistent revocation failed, refusing to rotate"
                );
                Err(store_failure(e, || {
                    AuthError::service_unavailable(
                        "refresh: persistent store unavailable for revocation",
                    )
                }))
            }
        }
    }

    // ========================================================================
    // Logout
    // ========================================================================

    /// Revokes a refresh token in both stores.
    ///
    /// Idempotent: an unknown or already revoked token yields
    /// `LogoutResult { success: false }`.
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` if the persistent store could not confirm the
    /// revocation. A cache tombstone is still written when possible, and the
    /// call is safe to retry.
    pub async fn logout(&self, refresh_token: &str) -> AuthResult<LogoutResult> {
        let now = OffsetDateTime::now_utc();
        let token_hash = hash_token(refresh_token);
        let key = self.keys.refresh(&token_hash);

        let prior = self.cache.get::<CachedRefreshToken>(&key).await;
        let outcome = self.repository.revoke_refresh_token(&token_hash, now, None).await;

        let fallback_ttl = match &prior {
            Some(CachedRefreshToken::Active(record)) => record.remaining_lifetime(now),
            _ => self.issuer.refresh_token_lifetime(),
        };

        match outcome {
            Ok(RevokeOutcome::Revoked(record)) => {
                self.write_tombstone(&key, now, record.remaining_lifetime(now))
                    .await;
                if let Err(e) = self
                    .repository
                    .end_session(record.session_id, SessionEndReason::Logout, now)
                    .await
                {
                    debug!(session_id = %record.session_id, error = %e, "Failed to end session");
                }
                info!(
                    user_id = %record.user_id,
                    session_id = %record.session_id,
                    "User logged out"
                );
                Ok(LogoutResult { success: true })
            }
            Ok(RevokeOutcome::AlreadyRevoked) => {
                self.write_tombstone(&key, now, fallback_ttl).await;
                Ok(LogoutResult { success: false })
            }
            Ok(RevokeOutcome::NotFound) => match prior {
                // Only ever reached the cache
                Some(CachedRefreshToken::Active(_)) => {
                    self.write_tombstone(&key, now, fallback_ttl).await;
                    Ok(LogoutResult { success: true })
                }
                _ => Ok(LogoutResult { success: false }),
            },
            Err(e) => {
                warn!(
                    token = hash_prefix(&token_hash),
                    error = %e,
                    "Persistent revocation failed during logout"
                );
                // The tombstone blocks reuse through this cache, but only the
                // persistent store can confirm the revocation.
                let tombstoned = self.write_tombstone(&key, now, fallback_ttl).await;
                Err(store_failure(e, || {
                    if tombstoned {
                        AuthError::service_unavailable(
                            "logout: persistent store unavailable, revocation not confirmed",
                        )
                    } else {
                        both_stores_down("logout")
                    }
                }))
            }
        }
    }

    /// Revokes every refresh token of a user and drops the cached principal.
    ///
    /// Returns the number of tokens revoked.
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` if the persistent store is unreachable; the cache
    /// cannot enumerate a user's tokens.
    pub async fn logout_all(&self, user_id: Uuid) -> AuthResult<usize> {
        let now = OffsetDateTime::now_utc();
        let hashes = self
            .repository
            .revoke_all_for_user(user_id, now)
            .await
            .map_err(|e| {
                warn!(user_id = %user_id, error = %e, "Failed to revoke user tokens");
                store_failure(e, || AuthError::service_unavailable("persistent store unavailable"))
            })?;

        let lifetime = self.issuer.refresh_token_lifetime();
        for hash in &hashes {
            self.write_tombstone(&self.keys.refresh(hash), now, lifetime)
                .await;
        }

        if let Err(e) = self
            .repository
            .end_sessions_for_user(user_id, SessionEndReason::Revoked, now)
            .await
        {
            debug!(user_id = %user_id, error = %e, "Failed to end sessions");
        }
        self.cache.remove(&self.keys.principal(user_id)).await;

        info!(user_id = %user_id, revoked = hashes.len(), "Revoked all sessions");
        Ok(hashes.len())
    }

    // ========================================================================
    // Claims
    // ========================================================================

    /// Loads a principal, cache first.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` if the user does not exist
    /// - `ServiceUnavailable` on a cache miss while the principal store is down
    pub async fn get_claims(&self, user_id: Uuid) -> AuthResult<Principal> {
        let key = self.keys.principal(user_id);
        if let Some(principal) = self.cache.get::<Principal>(&key).await {
            return Ok(principal);
        }

        match self.principals.find_by_id(user_id).await {
            Ok(Some(principal)) => {
                self.cache
                    .set(&key, &principal, self.config.principal_ttl)
                    .await;
                Ok(principal)
            }
            Ok(None) => Err(unauthenticated(UnauthenticatedReason::UnknownPrincipal)),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Principal lookup failed after cache miss");
                Err(store_failure(e, || both_stores_down("get_claims")))
            }
        }
    }

    // ========================================================================
    // Password reset
    // ========================================================================

    /// Issues a password reset token for `username`.
    ///
    /// Returns `None` for unknown users; callers should respond identically
    /// in both cases.
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` if the token could not be stored.
    pub async fn request_password_reset(&self, username: &str) -> AuthResult<Option<String>> {
        let principal = match self.principals.find_by_username(username).await {
            Ok(Some(principal)) => principal,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "Principal lookup failed during password reset");
                return Err(store_failure(e, || {
                    AuthError::service_unavailable("principal store unavailable")
                }));
            }
        };

        let now = OffsetDateTime::now_utc();
        let token = generate_token();
        let record = PasswordResetToken::new(
            hash_token(&token),
            principal.user_id,
            now,
            now + self.config.password_reset_lifetime,
        );

        self.repository
            .create_reset_token(&record)
            .await
            .map_err(|e| {
                warn!(user_id = %principal.user_id, error = %e, "Failed to store reset token");
                store_failure(e, || AuthError::service_unavailable("persistent store unavailable"))
            })?;

        info!(user_id = %principal.user_id, "Password reset requested");
        Ok(Some(token))
    }

    /// Consumes a password reset token and returns its owner.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` if the token is unknown, used or expired
    /// - `ServiceUnavailable` if the persistent store is unreachable
    pub async fn redeem_password_reset(&self, token: &str) -> AuthResult<Uuid> {
        let now = OffsetDateTime::now_utc();
        match self
            .repository
            .consume_reset_token(&hash_token(token), now)
            .await
        {
            Ok(Some(record)) => {
                info!(user_id = %record.user_id, "Password reset token redeemed");
                Ok(record.user_id)
            }
            Ok(None) => Err(unauthenticated(UnauthenticatedReason::UnknownToken)),
            Err(e) => {
                warn!(error = %e, "Failed to consume reset token");
                Err(store_failure(e, || {
                    AuthError::service_unavailable("persistent store unavailable")
                }))
            }
        }
    }

    // ========================================================================
    // Store helpers
    // ========================================================================

    async fn persist_record(&self, record: &RefreshTokenRecord) -> bool {
        match self.repository.create_refresh_token(record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    user_id = %record.user_id,
                    token = hash_prefix(&record.token_hash),
                    error = %e,
                    "Failed to persist refresh token"
                );
                false
            }
        }
    }

    async fn cache_record(&self, record: &RefreshTokenRecord, now: OffsetDateTime) -> bool {
        let ttl = record.remaining_lifetime(now);
        if ttl.is_zero() {
            return false;
        }
        self.cache
            .set(
                &self.keys.refresh(&record.token_hash),
                &CachedRefreshToken::Active(record.clone()),
                ttl,
            )
            .await
    }

    async fn write_tombstone(&self, key: &str, now: OffsetDateTime, ttl: Duration) -> bool {
        self.cache
            .set(
                key,
                &CachedRefreshToken::Revoked { revoked_at: now },
                at_least_one_second(ttl),
            )
            .await
    }
}

impl std::fmt::Debug for AuthOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthOrchestrator")
            .field("issuer", &self.issuer)
            .field("cache", &self.cache)
            .field("keys", &self.keys)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
