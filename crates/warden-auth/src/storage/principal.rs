//! Principal lookup trait.

use async_trait::async_trait;
use uuid::Uuid;

use crate::AuthResult;
use crate::types::Principal;

/// Read access to users and their role/claim data.
#[async_trait]
pub trait PrincipalStorage: Send + Sync {
    /// Finds a principal by login name.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<Principal>>;

    /// Finds a principal by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, user_id: Uuid) -> AuthResult<Option<Principal>>;
}
