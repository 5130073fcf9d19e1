//! Credential verification trait.

use async_trait::async_trait;

use crate::AuthResult;

/// Checks a username/password pair.
///
/// Password hashing and storage belong to the implementation; the auth flows
/// only consume the boolean outcome.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Returns `true` if the credentials are correct.
    ///
    /// Unknown users must return `Ok(false)`, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backing store could not be queried.
    async fn validate_user(&self, username: &str, password: &str) -> AuthResult<bool>;
}
