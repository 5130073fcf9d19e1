//! Flow results returned to the API layer.

use serde::Serialize;
use time::OffsetDateTime;

use crate::types::UserInfo;

/// Successful login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub user: UserInfo,
}

/// Successful refresh.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResult {
    pub access_token: String,
    /// The rotated refresh token. Always present under single-use rotation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Logout outcome.
///
/// `success` is `false` when the token was already revoked or unknown; that
/// is a no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogoutResult {
    pub success: bool,
}
