//! Cache backend error types.
//!
//! These errors describe faults raised by a [`CacheBackend`](crate::CacheBackend).
//! They never cross the [`SessionStore`](crate::SessionStore) boundary: the
//! store logs them, flips its availability flag and returns a degraded result.

/// Errors that can occur while talking to a cache backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Could not obtain a connection to the backend.
    #[error("Cache connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// The backend rejected or failed to execute a command.
    #[error("Cache command error: {message}")]
    Command {
        /// Description of the command failure.
        message: String,
    },

    /// A value could not be encoded or decoded.
    #[error("Cache serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// A synthetic health cycle read back something other than what it wrote.
    #[error("Cache health check mismatch: {message}")]
    Mismatch {
        /// Description of the mismatch.
        message: String,
    },
}

impl CacheError {
    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Command` error.
    #[must_use]
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command {
            message: message.into(),
        }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new `Mismatch` error.
    #[must_use]
    pub fn mismatch(message: impl Into<String>) -> Self {
        Self::Mismatch {
            message: message.into(),
        }
    }

    /// Returns `true` if this error means the backend itself is unhealthy.
    ///
    /// Serialization errors are caused by the value, not the backend, and do
    /// not count as an outage.
    #[must_use]
    pub fn is_backend_fault(&self) -> bool {
        !matches!(self, Self::Serialization { .. })
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            Self::connection(err.to_string())
        } else {
            Self::command(err.to_string())
        }
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::connection(err.to_string())
    }
}

/// Result type for cache backend operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_fault_classification() {
        assert!(CacheError::connection("refused").is_backend_fault());
        assert!(CacheError::command("WRONGTYPE").is_backend_fault());
        assert!(CacheError::mismatch("expected a got b").is_backend_fault());
        assert!(!CacheError::serialization("bad msgpack").is_backend_fault());
    }

    #[test]
    fn test_error_display() {
        let err = CacheError::connection("timed out");
        assert_eq!(err.to_string(), "Cache connection error: timed out");
    }
}
