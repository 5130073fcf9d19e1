//! Core auth domain types.

mod principal;
mod refresh_token;
mod reset_token;
mod session;

pub use principal::{Principal, UserInfo};
pub use refresh_token::{CachedRefreshToken, RefreshTokenRecord};
pub use reset_token::PasswordResetToken;
pub use session::{SessionEndReason, UserSession};

use serde::{Deserialize, Serialize};

/// Network origin of a login, recorded on tokens and sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOrigin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl ClientOrigin {
    #[must_use]
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
        }
    }
}
