//! PostgreSQL storage backend for warden auth
//!
//! Provides persistent storage for:
//!
//! - Refresh tokens, hashed (`refresh_tokens`)
//! - User sessions (`user_sessions`)
//! - Password reset tokens, hashed (`password_reset_tokens`)
//! - Users with Argon2 password hashes (`users`)
//!
//! [`storage_adapters`] wraps these tables in the `warden-auth` storage
//! traits so they can be handed to the orchestrator as `Arc<dyn ...>`.
//!
//! # Example
//!
//! ```ignore
//! use warden_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::connect("postgres://localhost/warden").await?;
//! storage.ensure_schema().await?;
//!
//! let record = storage.refresh_tokens().find_by_hash(&hash).await?;
//! ```

pub mod password;
pub mod refresh_token;
pub mod reset_token;
pub mod schema;
pub mod session;
pub mod storage_adapters;
pub mod user;

use std::sync::Arc;

use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use refresh_token::RefreshTokenStorage;
pub use reset_token::ResetTokenStorage;
pub use session::SessionStorage;
pub use storage_adapters::{
    Argon2CredentialVerifier, PostgresPrincipalStorage, PostgresSessionRepository,
};
pub use user::UserStorage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during auth storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Requested row was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row already exists (conflict).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data could not be interpreted.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Password hashing failed.
    #[error("Password hash error: {0}")]
    PasswordHash(String),
}

impl StorageError {
    // -------------------------------------------------------------------------
    // Constructor Methods
    // -------------------------------------------------------------------------

    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an `InvalidData` error.
    #[must_use]
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    /// Create a `PasswordHash` error.
    #[must_use]
    pub fn password_hash(message: impl Into<String>) -> Self {
        Self::PasswordHash(message.into())
    }

    // -------------------------------------------------------------------------
    // Predicate Methods
    // -------------------------------------------------------------------------

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns `true` if this is a database error.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// Returns `true` if the database could not be reached or the pool gave
    /// up waiting for a connection.
    #[must_use]
    pub fn is_connectivity_error(&self) -> bool {
        matches!(
            self,
            Self::Database(
                sqlx_core::Error::Io(_)
                    | sqlx_core::Error::Tls(_)
                    | sqlx_core::Error::PoolTimedOut
                    | sqlx_core::Error::PoolClosed
                    | sqlx_core::Error::WorkerCrashed
            )
        )
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// Unique violations surface as `Conflict`; everything else passes through.
pub(crate) fn map_insert_error(e: sqlx_core::Error, what: impl FnOnce() -> String) -> StorageError {
    if let sqlx_core::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StorageError::conflict(what());
    }
    StorageError::from(e)
}

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// PostgreSQL storage backend for authentication data.
///
/// Holds a connection pool and hands out short-lived, borrowing storage
/// types for each table.
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new().connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Create new storage with a lazily connecting pool.
    ///
    /// Startup does not wait for the database; the first query connects.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn connect_lazy(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: std::time::Duration,
    ) -> Result<Self, StorageError> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(database_url)?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Creates the auth tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails.
    pub async fn ensure_schema(&self) -> StorageResult<()> {
        schema::ensure_schema(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a reference to the Arc-wrapped pool.
    #[must_use]
    pub fn pool_arc(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    /// Get refresh token storage operations.
    #[must_use]
    pub fn refresh_tokens(&self) -> RefreshTokenStorage<'_> {
        RefreshTokenStorage::new(&self.pool)
    }

    /// Get session storage operations.
    #[must_use]
    pub fn sessions(&self) -> SessionStorage<'_> {
        SessionStorage::new(&self.pool)
    }

    /// Get password reset token storage operations.
    #[must_use]
    pub fn reset_tokens(&self) -> ResetTokenStorage<'_> {
        ResetTokenStorage::new(&self.pool)
    }

    /// Get user storage operations.
    #[must_use]
    pub fn users(&self) -> UserStorage<'_> {
        UserStorage::new(&self.pool)
    }

    // -------------------------------------------------------------------------
    // Adapters
    // -------------------------------------------------------------------------

    /// Persistent session repository backed by this pool.
    #[must_use]
    pub fn session_repository(&self) -> PostgresSessionRepository {
        PostgresSessionRepository::new(self.pool_arc())
    }

    /// Principal storage backed by this pool.
    #[must_use]
    pub fn principal_storage(&self) -> PostgresPrincipalStorage {
        PostgresPrincipalStorage::new(self.pool_arc())
    }

    /// Credential verifier backed by this pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the timing-equalization hash cannot be computed.
    pub fn credential_verifier(&self) -> StorageResult<Argon2CredentialVerifier> {
        Argon2CredentialVerifier::new(self.pool_arc())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_not_found() {
        let err = StorageError::not_found("RefreshToken abc123");
        assert!(err.is_not_found());
        assert!(!err.is_database_error());
        assert_eq!(err.to_string(), "Not found: RefreshToken abc123");
    }

    #[test]
    fn test_storage_error_conflict() {
        let err = StorageError::conflict("token hash already exists");
        assert!(err.is_conflict());
        assert!(!err.is_connectivity_error());
    }

    #[test]
    fn test_connectivity_errors() {
        assert!(StorageError::from(sqlx_core::Error::PoolTimedOut).is_connectivity_error());
        assert!(StorageError::from(sqlx_core::Error::RowNotFound).is_database_error());
        assert!(!StorageError::from(sqlx_core::Error::RowNotFound).is_connectivity_error());
    }

    #[test]
    fn test_storage_error_serialization() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err = StorageError::from(json_err);
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_connect_lazy_defers_connection() {
        let storage = PostgresAuthStorage::connect_lazy(
            "postgres://warden@127.0.0.1:1/warden",
            2,
            std::time::Duration::from_millis(100),
        )
        .unwrap();
        assert!(storage.users().find_by_username("alice").await.is_err());
    }
}
