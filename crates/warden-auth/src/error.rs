//! Authentication error types.
//!
//! Every failed login, refresh or logout surfaces to callers as one of two
//! kinds: a uniform [`AuthError::Unauthenticated`], whose message never
//! reveals the cause, or a retryable [`AuthError::ServiceUnavailable`] when
//! neither the session cache nor the persistent store could answer.

use std::fmt;

/// Errors that can occur during authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The caller could not be authenticated.
    ///
    /// The display string is fixed so that unknown users, wrong passwords
    /// and revoked tokens are indistinguishable to the caller. The reason is
    /// kept for logs and audit only.
    #[error("authentication failed")]
    Unauthenticated {
        /// Why authentication failed. Never shown to the caller.
        reason: UnauthenticatedReason,
    },

    /// Both the session cache and the persistent store failed.
    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        /// Description of the failure.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// A token could not be produced or parsed.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

/// Internal cause of an [`AuthError::Unauthenticated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnauthenticatedReason {
    /// Unknown user or wrong password.
    InvalidCredentials,
    /// The presented token is not known to either store.
    UnknownToken,
    /// The presented token has expired.
    ExpiredToken,
    /// The presented token has been revoked or already rotated.
    RevokedToken,
    /// The principal referenced by a token no longer exists.
    UnknownPrincipal,
}

impl fmt::Display for UnauthenticatedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid_credentials"),
            Self::UnknownToken => write!(f, "unknown_token"),
            Self::ExpiredToken => write!(f, "expired_token"),
            Self::RevokedToken => write!(f, "revoked_token"),
            Self::UnknownPrincipal => write!(f, "unknown_principal"),
        }
    }
}

impl AuthError {
    /// Creates a new `Unauthenticated` error.
    #[must_use]
    pub fn unauthenticated(reason: UnauthenticatedReason) -> Self {
        Self::Unauthenticated { reason }
    }

    /// Creates a new `ServiceUnavailable` error.
    #[must_use]
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller failed to authenticate.
    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated { .. })
    }

    /// Returns `true` if a store could not be reached.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }

    /// Returns `true` if retrying the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }

    /// Returns the internal reason for an `Unauthenticated` error.
    #[must_use]
    pub fn unauthenticated_reason(&self) -> Option<UnauthenticatedReason> {
        match self {
            Self::Unauthenticated { reason } => Some(*reason),
            _ => None,
        }
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthenticated { .. } => ErrorCategory::Authentication,
            Self::ServiceUnavailable { .. } => ErrorCategory::Unavailable,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::InvalidToken { .. } => ErrorCategory::Token,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// HTTP status an API layer should answer with.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self.category() {
            ErrorCategory::Authentication | ErrorCategory::Token => 401,
            ErrorCategory::Unavailable => 503,
            ErrorCategory::Infrastructure
            | ErrorCategory::Configuration
            | ErrorCategory::Internal => 500,
        }
    }
}

/// Categories of authentication errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Identity could not be established.
    Authentication,
    /// Token encoding/decoding problems.
    Token,
    /// Both stores down; retryable.
    Unavailable,
    /// A single storage backend failed.
    Infrastructure,
    /// Configuration errors.
    Configuration,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Token => write!(f, "token"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
