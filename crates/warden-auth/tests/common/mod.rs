//! Shared fixtures for orchestrator tests.
//!
//! Every store here can be switched off at runtime to simulate an outage.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;
use warden_auth::{
    AuthConfig, AuthError, AuthOrchestrator, AuthResult, CredentialVerifier, OrchestratorConfig,
    PasswordResetToken, PersistentSessionRepository, Principal, PrincipalStorage,
    RefreshTokenRecord, RevokeOutcome, SessionEndReason, TokenIssuer, UserSession,
};
use warden_cache::{CacheBackend, CacheError, CacheResult, LocalCacheBackend, SessionStore};

pub const PASSWORD: &str = "correct-horse-battery-staple";

fn outage() -> AuthError {
    AuthError::storage("connection refused")
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Default)]
pub struct FlakyCache {
    pub inner: LocalCacheBackend,
    pub down: AtomicBool,
}

impl FlakyCache {
    fn check(&self) -> CacheResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(CacheError::connection("connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheBackend for FlakyCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.check()?;
        self.inner.set_ex(key, value, ttl).await
    }

    async fn del(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        self.inner.del(key).await
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        self.check()?;
        self.inner.ttl(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.check()?;
        self.inner.expire(key, ttl).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> CacheResult<i64> {
        self.check()?;
        self.inner.incr_by(key, delta).await
    }

    async fn ping(&self) -> CacheResult<()> {
        self.check()
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

// ============================================================================
// Persistent repository
// ============================================================================

#[derive(Default)]
pub struct InMemoryRepository {
    pub tokens: RwLock<HashMap<String, RefreshTokenRecord>>,
    pub sessions: RwLock<HashMap<Uuid, UserSession>>,
    pub resets: RwLock<HashMap<String, PasswordResetToken>>,
    pub down: AtomicBool,
    /// Reachable, but every call fails with a non-storage error.
    pub corrupt: AtomicBool,
}

impl InMemoryRepository {
    fn check(&self) -> AuthResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(outage())
        } else if self.corrupt.load(Ordering::SeqCst) {
            Err(AuthError::internal("invalid row"))
        } else {
            Ok(())
        }
    }

    pub fn token(&self, hash: &str) -> Option<RefreshTokenRecord> {
        self.tokens.read().unwrap().get(hash).cloned()
    }

    pub fn session(&self, id: Uuid) -> Option<UserSession> {
        self.sessions.read().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl PersistentSessionRepository for InMemoryRepository {
    async fn create_refresh_token(&self, record: &RefreshTokenRecord) -> AuthResult<()> {
        self.check()?;
        let mut tokens = self.tokens.write().unwrap();
        if tokens.contains_key(&record.token_hash) {
            return Err(AuthError::storage("duplicate token hash"));
        }
        tokens.insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_refresh_token(&self, token_hash: &str) -> AuthResult<Option<RefreshTokenRecord>> {
        self.check()?;
        Ok(self.token(token_hash))
    }

    async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        at: OffsetDateTime,
        replaced_by: Option<&str>,
    ) -> AuthResult<RevokeOutcome> {
        self.check()?;
        let mut tokens = self.tokens.write().unwrap();
        let Some(record) = tokens.get_mut(token_hash) else {
            return Ok(RevokeOutcome::NotFound);
        };
        if record.revoked_at.is_some() {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }
        record.revoked_at = Some(at);
        record.last_used_at = Some(at);
        record.replaced_by = replaced_by.map(str::to_string);
        Ok(RevokeOutcome::Revoked(Box::new(record.clone())))
    }

    async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        at: OffsetDateTime,
    ) -> AuthResult<Vec<String>> {
        self.check()?;
        let mut tokens = self.tokens.write().unwrap();
        let mut revoked = Vec::new();
        for record in tokens.values_mut() {
            if record.user_id == user_id && record.revoked_at.is_none() {
                record.revoked_at = Some(at);
                revoked.push(record.token_hash.clone());
            }
        }
        Ok(revoked)
    }

    async fn create_session(&self, session: &UserSession) -> AuthResult<()> {
        self.check()?;
        self.sessions
            .write()
            .unwrap()
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn touch_session(
        &self,
        session_id: Uuid,
        current_token_hash: &str,
        at: OffsetDateTime,
    ) -> AuthResult<()> {
        self.check()?;
        if let Some(session) = self.sessions.write().unwrap().get_mut(&session_id) {
            session.current_token_hash = current_token_hash.to_string();
            session.last_activity_at = at;
        }
        Ok(())
    }

    async fn end_session(
        &self,
        session_id: Uuid,
        reason: SessionEndReason,
        at: OffsetDateTime,
    ) -> AuthResult<()> {
        self.check()?;
        if let Some(session) = self.sessions.write().unwrap().get_mut(&session_id)
            && session.ended_at.is_none()
        {
            session.ended_at = Some(at);
            session.end_reason = Some(reason);
        }
        Ok(())
    }

    async fn end_sessions_for_user(
        &self,
        user_id: Uuid,
        reason: SessionEndReason,
        at: OffsetDateTime,
    ) -> AuthResult<u64> {
        self.check()?;
        let mut ended = 0;
        for session in self.sessions.write().unwrap().values_mut() {
            if session.user_id == user_id && session.ended_at.is_none() {
                session.ended_at = Some(at);
                session.end_reason = Some(reason);
                ended += 1;
            }
        }
        Ok(ended)
    }

    async fn create_reset_token(&self, token: &PasswordResetToken) -> AuthResult<()> {
        self.check()?;
        self.resets
            .write()
            .unwrap()
            .insert(token.token_hash.clone(), token.clone());
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        at: OffsetDateTime,
    ) -> AuthResult<Option<PasswordResetToken>> {
        self.check()?;
        let mut resets = self.resets.write().unwrap();
        match resets.get_mut(token_hash) {
            Some(token) if token.is_redeemable_at(at) => {
                token.used_at = Some(at);
                Ok(Some(token.clone()))
            }
            _ => Ok(None),
        }
    }
}

// ============================================================================
// Principals and credentials
// ============================================================================

#[derive(Default)]
pub struct InMemoryPrincipals {
    pub users: RwLock<HashMap<String, (Principal, String)>>,
    pub down: AtomicBool,
}

impl InMemoryPrincipals {
    pub fn add(&self, principal: Principal, password: &str) {
        self.users
            .write()
            .unwrap()
            .insert(principal.username.clone(), (principal, password.to_string()));
    }

    pub fn remove(&self, username: &str) {
        self.users.write().unwrap().remove(username);
    }

    fn check(&self) -> AuthResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(outage())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PrincipalStorage for InMemoryPrincipals {
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<Principal>> {
        self.check()?;
        Ok(self
            .users
            .read()
            .unwrap()
            .get(username)
            .map(|(p, _)| p.clone()))
    }

    async fn find_by_id(&self, user_id: Uuid) -> AuthResult<Option<Principal>> {
        self.check()?;
        Ok(self
            .users
            .read()
            .unwrap()
            .values()
            .find(|(p, _)| p.user_id == user_id)
            .map(|(p, _)| p.clone()))
    }
}

#[async_trait]
impl CredentialVerifier for InMemoryPrincipals {
    async fn validate_user(&self, username: &str, password: &str) -> AuthResult<bool> {
        self.check()?;
        Ok(self
            .users
            .read()
            .unwrap()
            .get(username)
            .is_some_and(|(_, expected)| expected == password))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub orchestrator: Arc<AuthOrchestrator>,
    pub cache_backend: Arc<FlakyCache>,
    pub cache: Arc<SessionStore>,
    pub repository: Arc<InMemoryRepository>,
    pub principals: Arc<InMemoryPrincipals>,
    pub alice: Principal,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AuthConfig) -> Self {
        let cache_backend = Arc::new(FlakyCache::default());
        let cache = Arc::new(SessionStore::new(cache_backend.clone()));
        let repository = Arc::new(InMemoryRepository::default());
        let principals = Arc::new(InMemoryPrincipals::default());

        let alice = Principal::new(Uuid::new_v4(), "alice")
            .with_email("alice@example.com")
            .with_roles(["employee", "hr"]);
        principals.add(alice.clone(), PASSWORD);

        let issuer = Arc::new(TokenIssuer::new(&config).expect("valid test config"));
        let orchestrator = Arc::new(AuthOrchestrator::new(
            issuer,
            cache.clone(),
            repository.clone(),
            principals.clone(),
            principals.clone(),
            OrchestratorConfig::from_auth_config(&config),
        ));

        Self {
            orchestrator,
            cache_backend,
            cache,
            repository,
            principals,
            alice,
        }
    }

    /// Takes the cache down and lets the store notice.
    pub async fn cache_down(&self) {
        self.cache_backend.down.store(true, Ordering::SeqCst);
        self.cache.get::<String>("probe").await;
        assert!(!self.cache.is_available());
    }

    /// Brings the cache back and recovers the store.
    pub async fn cache_up(&self) {
        self.cache_backend.down.store(false, Ordering::SeqCst);
        self.cache.probe().await.expect("cache reachable");
        assert!(self.cache.is_available());
    }

    pub fn repository_down(&self, down: bool) {
        self.repository.down.store(down, Ordering::SeqCst);
    }

    pub fn principals_down(&self, down: bool) {
        self.principals.down.store(down, Ordering::SeqCst);
    }
}

pub fn test_config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.issuer = "https://auth.example.com".to_string();
    config.audience = "warden-api".to_string();
    config.signing.secret = "test-secret-with-at-least-32-bytes!!".to_string();
    config.session_cache.key_prefix = "test".to_string();
    config
}
