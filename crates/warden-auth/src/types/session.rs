//! User session audit records.
//!
//! A session groups every refresh token of one login lineage. Sessions are
//! informational: revocation is decided by the refresh token records, and a
//! failed session write never fails a login, refresh or logout.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::ClientOrigin;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    /// The user logged out of this session.
    Logout,
    /// Revoked as part of a revoke-all or reuse detection.
    Revoked,
    /// The refresh lineage expired.
    Expired,
}

impl SessionEndReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for SessionEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionEndReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "logout" => Ok(Self::Logout),
            "revoked" => Ok(Self::Revoked),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown session end reason: {other}")),
        }
    }
}

/// One login lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub id: Uuid,
    pub user_id: Uuid,

    /// Hash of the refresh token currently representing the session.
    pub current_token_hash: String,

    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub last_activity_at: OffsetDateTime,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub ended_at: Option<OffsetDateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<SessionEndReason>,

    #[serde(default)]
    pub origin: ClientOrigin,
}

impl UserSession {
    /// Starts a new session.
    #[must_use]
    pub fn start(
        id: Uuid,
        user_id: Uuid,
        token_hash: impl Into<String>,
        now: OffsetDateTime,
        origin: ClientOrigin,
    ) -> Self {
        Self {
            id,
            user_id,
            current_token_hash: token_hash.into(),
            started_at: now,
            last_activity_at: now,
            ended_at: None,
            end_reason: None,
            origin,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_is_active() {
        let now = OffsetDateTime::now_utc();
        let session = UserSession::start(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "hash",
            now,
            ClientOrigin::default(),
        );
        assert!(session.is_active());
        assert_eq!(session.started_at, session.last_activity_at);
    }

    #[test]
    fn test_end_reason_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionEndReason::Logout).unwrap(),
            "\"logout\""
        );
        assert_eq!(SessionEndReason::Expired.to_string(), "expired");
        assert_eq!("revoked".parse(), Ok(SessionEndReason::Revoked));
        assert!("closed".parse::<SessionEndReason>().is_err());
    }
}
