//! # warden-auth
//!
//! Token lifecycle and session flows for warden.
//!
//! This crate provides:
//! - Signed access tokens and opaque, hashed refresh tokens
//! - Login, refresh (single-use rotation), logout and claims flows that keep
//!   working when either the session cache or the persistent store is down
//! - Password reset tokens
//! - Storage traits for the persistent session repository, principals and
//!   credential verification
//!
//! ## Modules
//!
//! - [`config`] - Authentication configuration
//! - [`token`] - Token generation and validation
//! - [`service`] - The [`AuthOrchestrator`] and its results
//! - [`storage`] - Storage traits for auth-related data
//! - [`types`] - Domain records

pub mod config;
pub mod error;
pub mod service;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory, UnauthenticatedReason};
pub use service::{
    AuthOrchestrator, LoginResult, LogoutResult, OrchestratorConfig, RefreshResult, SessionKeys,
};
pub use storage::{CredentialVerifier, PersistentSessionRepository, PrincipalStorage, RevokeOutcome};
pub use token::{AccessTokenClaims, InvalidTokenReason, TokenIssuer, TokenValidation};
pub use types::{
    CachedRefreshToken, ClientOrigin, PasswordResetToken, Principal, RefreshTokenRecord,
    SessionEndReason, UserInfo, UserSession,
};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::AuthConfig;
    pub use crate::error::{AuthError, UnauthenticatedReason};
    pub use crate::service::{AuthOrchestrator, LoginResult, LogoutResult, RefreshResult};
    pub use crate::storage::{CredentialVerifier, PersistentSessionRepository, PrincipalStorage};
    pub use crate::token::TokenIssuer;
    pub use crate::types::{ClientOrigin, Principal};
}
