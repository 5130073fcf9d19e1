//! Access and refresh token issuance.
//!
//! [`TokenIssuer`] is built once at startup from [`AuthConfig`]. A missing or
//! weak signing secret is rejected there, so issuing and validating tokens
//! never fails because of configuration afterwards.

use std::fmt;
use std::time::Duration;

use time::OffsetDateTime;

use super::jwt::{AccessTokenClaims, JwtError, JwtService, SigningAlgorithm};
use super::opaque;
use crate::config::{AuthConfig, ConfigError};
use crate::error::AuthError;
use crate::types::Principal;
use crate::AuthResult;

/// A freshly signed access token.
#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    /// Compact JWS.
    pub token: String,
    pub claims: AccessTokenClaims,
    pub expires_at: OffsetDateTime,
}

/// Result of [`TokenIssuer::validate_token`].
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValidation {
    Valid(AccessTokenClaims),
    Invalid(InvalidTokenReason),
}

impl TokenValidation {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    #[must_use]
    pub fn claims(&self) -> Option<&AccessTokenClaims> {
        match self {
            Self::Valid(claims) => Some(claims),
            Self::Invalid(_) => None,
        }
    }
}

/// Why a token failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidTokenReason {
    /// Not a parseable JWT.
    Malformed,
    /// Signature or algorithm mismatch.
    Signature,
    Issuer,
    Audience,
    Expired,
    /// A required claim is missing or invalid.
    Claims,
}

impl fmt::Display for InvalidTokenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Malformed => "malformed",
            Self::Signature => "signature",
            Self::Issuer => "issuer",
            Self::Audience => "audience",
            Self::Expired => "expired",
            Self::Claims => "claims",
        };
        f.write_str(s)
    }
}

impl From<JwtError> for InvalidTokenReason {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => Self::Expired,
            JwtError::InvalidSignature | JwtError::InvalidKey { .. } => Self::Signature,
            JwtError::InvalidIssuer => Self::Issuer,
            JwtError::InvalidAudience => Self::Audience,
            JwtError::InvalidClaims { .. } => Self::Claims,
            JwtError::EncodingError { .. } | JwtError::DecodingError { .. } => Self::Malformed,
        }
    }
}

/// Creates and validates tokens.
///
/// Holds only the immutable signing key and lifetimes; safe to share across
/// tasks behind an `Arc`.
#[derive(Debug)]
pub struct TokenIssuer {
    jwt: JwtService,
    access_token_lifetime: Duration,
    refresh_token_lifetime: Duration,
}

impl TokenIssuer {
    /// Builds an issuer from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid; callers should
    /// treat this as fatal.
    pub fn new(config: &AuthConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let algorithm: SigningAlgorithm = config
            .signing
            .algorithm
            .parse()
            .map_err(|e: JwtError| ConfigError::InvalidValue(e.to_string()))?;

        Ok(Self {
            jwt: JwtService::new(
                algorithm,
                config.signing.secret.as_bytes(),
                config.issuer.clone(),
                config.audience.clone(),
            ),
            access_token_lifetime: config.tokens.access_token_lifetime,
            refresh_token_lifetime: config.tokens.refresh_token_lifetime,
        })
    }

    #[must_use]
    pub fn access_token_lifetime(&self) -> Duration {
        self.access_token_lifetime
    }

    #[must_use]
    pub fn refresh_token_lifetime(&self) -> Duration {
        self.refresh_token_lifetime
    }

    /// Signs an access token for `principal`, expiring `access_token_lifetime`
    /// from now.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the claims cannot be serialized.
    pub fn generate_access_token(&self, principal: &Principal) -> AuthResult<IssuedAccessToken> {
        self.generate_access_token_at(principal, OffsetDateTime::now_utc())
    }

    /// Signs an access token as if issued at `now`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the claims cannot be serialized.
    pub fn generate_access_token_at(
        &self,
        principal: &Principal,
        now: OffsetDateTime,
    ) -> AuthResult<IssuedAccessToken> {
        let lifetime = i64::try_from(self.access_token_lifetime.as_secs()).unwrap_or(i64::MAX);
        let claims = AccessTokenClaims::builder(
            self.jwt.issuer(),
            self.jwt.audience(),
            principal.user_id.to_string(),
        )
        .issued_at(now)
        .expires_in_seconds(lifetime)
        .username(principal.username.clone())
        .roles(principal.roles.clone())
        .build();

        let token = self
            .jwt
            .encode(&claims)
            .map_err(|e| AuthError::internal(e.to_string()))?;

        // `exp` has one-second resolution; report the precise instant
        Ok(IssuedAccessToken {
            token,
            expires_at: now + self.access_token_lifetime,
            claims,
        })
    }

    /// Generates an opaque refresh token (256 bits of entropy).
    #[must_use]
    pub fn generate_refresh_token(&self) -> String {
        opaque::generate_token()
    }

    /// Expiry for a refresh token issued at `now`.
    #[must_use]
    pub fn refresh_expiry_from(&self, now: OffsetDateTime) -> OffsetDateTime {
        now + self.refresh_token_lifetime
    }

    /// Validates signature, issuer, audience and expiry with zero clock skew.
    ///
    /// Never fails: malformed input yields `TokenValidation::Invalid`.
    #[must_use]
    pub fn validate_token(&self, token: &str) -> TokenValidation {
        self.validate_token_at(token, OffsetDateTime::now_utc())
    }

    /// Validates as of `now`.
    #[must_use]
    pub fn validate_token_at(&self, token: &str, now: OffsetDateTime) -> TokenValidation {
        match self.jwt.decode(token) {
            Ok(claims) if claims.is_expired_at(now) => {
                TokenValidation::Invalid(InvalidTokenReason::Expired)
            }
            Ok(claims) => TokenValidation::Valid(claims),
            Err(e) => TokenValidation::Invalid(e.into()),
        }
    }

    /// Cheap expiry check that does not verify the signature.
    ///
    /// Unparseable tokens count as expired. Use only as a pre-check; a
    /// `false` here says nothing about authenticity.
    #[must_use]
    pub fn is_expired(&self, token: &str) -> bool {
        self.is_expired_at(token, OffsetDateTime::now_utc())
    }

    /// Expiry pre-check as of `now`.
    #[must_use]
    pub fn is_expired_at(&self, token: &str, now: OffsetDateTime) -> bool {
        self.jwt
            .peek_expiry(token)
            .map(|exp| now.unix_timestamp() >= exp)
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.signing.secret = "0123456789abcdef0123456789abcdef".to_string();
        config
    }

    fn principal() -> Principal {
        Principal::new(Uuid::new_v4(), "alice").with_roles(["employee"])
    }

    #[test]
    fn test_rejects_missing_secret() {
        let err = TokenIssuer::new(&AuthConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_access_token_claims() {
        let issuer = TokenIssuer::new(&config()).unwrap();
        let principal = principal();
        let issued = issuer.generate_access_token(&principal).unwrap();

        assert_eq!(issued.claims.sub, principal.user_id.to_string());
        assert_eq!(issued.claims.username, "alice");
        assert_eq!(issued.claims.roles, vec!["employee"]);
        assert_eq!(issued.claims.iss, "warden");
        assert_eq!(issued.claims.aud, "warden-api");
        assert_eq!(issued.claims.exp - issued.claims.iat, 15 * 60);

        let validation = issuer.validate_token(&issued.token);
        assert_eq!(validation.claims(), Some(&issued.claims));
    }

    #[test]
    fn test_expiry_boundary_without_skew() {
        let issuer = TokenIssuer::new(&config()).unwrap();
        let t0 = OffsetDateTime::now_utc();
        let issued = issuer.generate_access_token_at(&principal(), t0).unwrap();

        let just_before = issued.expires_at - time::Duration::seconds(1);
        assert!(issuer.validate_token_at(&issued.token, just_before).is_valid());
        assert!(!issuer.is_expired_at(&issued.token, just_before));

        assert_eq!(
            issuer.validate_token_at(&issued.token, issued.expires_at),
            TokenValidation::Invalid(InvalidTokenReason::Expired)
        );
        assert!(issuer.is_expired_at(&issued.token, issued.expires_at));
    }

    #[test]
    fn test_sixteen_minutes_later() {
        let issuer = TokenIssuer::new(&config()).unwrap();
        let t0 = OffsetDateTime::now_utc();
        let first = issuer.generate_access_token_at(&principal(), t0).unwrap();
        assert_eq!(first.expires_at.unix_timestamp(), (t0 + time::Duration::minutes(15)).unix_timestamp());

        let t16 = t0 + time::Duration::minutes(16);
        assert_eq!(
            issuer.validate_token_at(&first.token, t16),
            TokenValidation::Invalid(InvalidTokenReason::Expired)
        );

        let second = issuer.generate_access_token_at(&principal(), t16).unwrap();
        assert_eq!(
            second.expires_at.unix_timestamp(),
            (t16 + time::Duration::minutes(15)).unix_timestamp()
        );
        assert!(issuer.validate_token_at(&second.token, t16).is_valid());
    }

    #[test]
    fn test_expires_at_keeps_subsecond_precision() {
        let issuer = TokenIssuer::new(&config()).unwrap();
        let t0 = OffsetDateTime::now_utc().replace_millisecond(100).unwrap();
        let first = issuer.generate_access_token_at(&principal(), t0).unwrap();
        let second = issuer
            .generate_access_token_at(&principal(), t0 + time::Duration::milliseconds(500))
            .unwrap();

        assert_eq!(first.claims.exp, second.claims.exp);
        assert!(second.expires_at > first.expires_at);
        assert_eq!(first.expires_at, t0 + time::Duration::minutes(15));
        assert_eq!(first.expires_at.unix_timestamp(), first.claims.exp);
    }

    #[test]
    fn test_malformed_input_never_panics() {
        let issuer = TokenIssuer::new(&config()).unwrap();
        for input in ["", "a", "a.b", "a.b.c", "....", "eyJhbGciOiJIUzI1NiJ9..x"] {
            assert!(!issuer.validate_token(input).is_valid());
            assert!(issuer.is_expired(input));
        }
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let issuer = TokenIssuer::new(&config()).unwrap();
        let mut other_config = config();
        other_config.issuer = "someone-else".to_string();
        let other = TokenIssuer::new(&other_config).unwrap();

        let issued = other.generate_access_token(&principal()).unwrap();
        assert_eq!(
            issuer.validate_token(&issued.token),
            TokenValidation::Invalid(InvalidTokenReason::Issuer)
        );
        // The cheap check only looks at exp
        assert!(!issuer.is_expired(&issued.token));
    }

    #[test]
    fn test_refresh_token_is_opaque() {
        let issuer = TokenIssuer::new(&config()).unwrap();
        let a = issuer.generate_refresh_token();
        let b = issuer.generate_refresh_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(!a.contains('.'));
    }
}
