//! Authentication configuration.
//!
//! All durations use humantime notation (`"15m"`, `"7d"`).
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! issuer = "https://auth.example.com"
//! audience = "warden-api"
//!
//! [auth.tokens]
//! access_token_lifetime = "15m"
//! refresh_token_lifetime = "7d"
//!
//! [auth.signing]
//! algorithm = "HS256"
//! secret = "change-me-to-at-least-32-bytes-of-entropy"
//!
//! [auth.session_cache]
//! health_check_interval = "1m"
//! reconnection_interval = "1m"
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Minimum signing secret length in bytes.
pub const MIN_SECRET_BYTES: usize = 32;

/// Root authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token issuer (`iss` claim).
    pub issuer: String,

    /// Token audience (`aud` claim).
    pub audience: String,

    /// Token lifetimes.
    pub tokens: TokenLifetimes,

    /// Token signing configuration.
    pub signing: SigningConfig,

    /// Session cache behaviour.
    pub session_cache: SessionCacheConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "warden".to_string(),
            audience: "warden-api".to_string(),
            tokens: TokenLifetimes::default(),
            signing: SigningConfig::default(),
            session_cache: SessionCacheConfig::default(),
        }
    }
}

/// Token lifetimes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenLifetimes {
    /// Access token lifetime. Minutes-scale.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime. Days-scale.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Password reset token lifetime.
    #[serde(with = "humantime_serde")]
    pub password_reset_lifetime: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::from_secs(15 * 60),
            refresh_token_lifetime: Duration::from_secs(7 * 24 * 3600),
            password_reset_lifetime: Duration::from_secs(30 * 60),
        }
    }
}

/// Token signing configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SigningConfig {
    /// HMAC algorithm: `HS256`, `HS384` or `HS512`.
    pub algorithm: String,

    /// Shared signing secret. Required, at least 32 bytes.
    pub secret: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            algorithm: "HS256".to_string(),
            secret: String::new(),
        }
    }
}

impl fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningConfig")
            .field("algorithm", &self.algorithm)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Session cache behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionCacheConfig {
    /// Delay between synthetic health cycles while the cache is up.
    #[serde(with = "humantime_serde")]
    pub health_check_interval: Duration,

    /// Delay between reconnection probes while the cache is down.
    #[serde(with = "humantime_serde")]
    pub reconnection_interval: Duration,

    /// How long a principal fetched by `get_claims` stays cached.
    #[serde(with = "humantime_serde")]
    pub principal_ttl: Duration,

    /// Prefix for every cache key.
    pub key_prefix: String,
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(60),
            reconnection_interval: Duration::from_secs(60),
            principal_ttl: Duration::from_secs(300),
            key_prefix: "warden".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the signing secret is not set, and
    /// `ConfigError::InvalidValue` if:
    /// - the issuer or audience is empty
    /// - the signing algorithm is not an HMAC algorithm
    /// - the signing secret is shorter than [`MIN_SECRET_BYTES`]
    /// - any lifetime or interval is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }

        if self.audience.is_empty() {
            return Err(ConfigError::InvalidValue(
                "audience cannot be empty".to_string(),
            ));
        }

        match self.signing.algorithm.as_str() {
            "HS256" | "HS384" | "HS512" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Invalid signing algorithm: '{}'. Must be HS256, HS384, or HS512",
                    other
                )));
            }
        }

        if self.signing.secret.is_empty() {
            return Err(ConfigError::Missing("signing.secret".to_string()));
        }

        if self.signing.secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::InvalidValue(format!(
                "signing.secret must be at least {} bytes",
                MIN_SECRET_BYTES
            )));
        }

        let durations = [
            ("tokens.access_token_lifetime", self.tokens.access_token_lifetime),
            ("tokens.refresh_token_lifetime", self.tokens.refresh_token_lifetime),
            ("tokens.password_reset_lifetime", self.tokens.password_reset_lifetime),
            (
                "session_cache.health_check_interval",
                self.session_cache.health_check_interval,
            ),
            (
                "session_cache.reconnection_interval",
                self.session_cache.reconnection_interval,
            ),
            ("session_cache.principal_ttl", self.session_cache.principal_ttl),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(format!("{} must be > 0", name)));
            }
        }

        if self.tokens.refresh_token_lifetime <= self.tokens.access_token_lifetime {
            return Err(ConfigError::InvalidValue(
                "tokens.refresh_token_lifetime must exceed access_token_lifetime".to_string(),
            ));
        }

        Ok(())
    }
}
