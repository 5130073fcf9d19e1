//! Refresh token domain type.
//!
//! # Security
//!
//! - Refresh tokens are stored as SHA-256 hashes, never plaintext
//! - A record is revoked exactly once; revoked records are never reactivated
//! - Rotation links each record to its successor through `replaced_by`

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::ClientOrigin;

/// Refresh token record as held by the persistent store and the cache.
///
/// The token itself is never stored. When validating a refresh token:
///
/// 1. Hash the incoming token
/// 2. Look up by hash
/// 3. Validate expiration and revocation status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRecord {
    /// Unique identifier for this record.
    pub id: Uuid,

    /// SHA-256 hash of the token value.
    pub token_hash: String,

    /// Owning user.
    pub user_id: Uuid,

    /// Owning user's login name.
    pub username: String,

    /// Session this token belongs to. Shared by every rotation of a lineage.
    pub session_id: Uuid,

    /// `jti` of the access token issued together with this refresh token.
    pub access_token_id: String,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Absolute expiry. Rotation does not extend it.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// When this token was revoked (None = not revoked).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub revoked_at: Option<OffsetDateTime>,

    /// When this token was last presented.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub last_used_at: Option<OffsetDateTime>,

    /// Hash of the token that replaced this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<String>,

    /// Where the token was issued to.
    #[serde(default)]
    pub origin: ClientOrigin,
}

impl RefreshTokenRecord {
    /// Creates a fresh, unrevoked record.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        token_hash: impl Into<String>,
        user_id: Uuid,
        username: impl Into<String>,
        session_id: Uuid,
        access_token_id: impl Into<String>,
        created_at: OffsetDateTime,
        expires_at: OffsetDateTime,
        origin: ClientOrigin,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            token_hash: token_hash.into(),
            user_id,
            username: username.into(),
            session_id,
            access_token_id: access_token_id.into(),
            created_at,
            expires_at,
            revoked_at: None,
            last_used_at: None,
            replaced_by: None,
            origin,
        }
    }

    /// Returns `true` if this token has expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Returns `true` if this token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Returns `true` if this token has been revoked.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Returns `true` if this token is valid at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        !self.is_expired_at(now) && !self.is_revoked()
    }

    /// Builds the record that replaces this one after rotation.
    ///
    /// The successor stays in the same session and keeps the original
    /// absolute expiry.
    #[must_use]
    pub fn successor(
        &self,
        token_hash: impl Into<String>,
        access_token_id: impl Into<String>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            token_hash: token_hash.into(),
            user_id: self.user_id,
            username: self.username.clone(),
            session_id: self.session_id,
            access_token_id: access_token_id.into(),
            created_at: now,
            expires_at: self.expires_at,
            revoked_at: None,
            last_used_at: None,
            replaced_by: None,
            origin: self.origin.clone(),
        }
    }

    /// Time left until expiry, zero when already expired.
    #[must_use]
    pub fn remaining_lifetime(&self, now: OffsetDateTime) -> std::time::Duration {
        let left = self.expires_at - now;
        left.try_into().unwrap_or(std::time::Duration::ZERO)
    }
}

/// Cache entry for a refresh token hash.
///
/// The cache is never authoritative, but a `Revoked` tombstone lets Refresh
/// reject a logged-out token without a database round trip, and keeps doing
/// so while the database is down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CachedRefreshToken {
    Active(RefreshTokenRecord),
    Revoked {
        #[serde(with = "time::serde::rfc3339")]
        revoked_at: OffsetDateTime,
    },
}
