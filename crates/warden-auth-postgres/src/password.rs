//! Argon2id password hashing.
//!
//! Hashes are stored in PHC string format, so parameters travel with the
//! hash and can be raised later without invalidating existing rows.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::{StorageError, StorageResult};

/// Hash a password for storage.
///
/// # Errors
///
/// Returns `PasswordHash` if hashing fails (rare).
pub fn hash_password(password: &str) -> StorageResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StorageError::password_hash(e.to_string()))
}

/// Verify a password against a stored PHC hash.
///
/// # Errors
///
/// Returns `PasswordHash` only if the stored hash is malformed; a wrong
/// password is `Ok(false)`.
pub fn verify_password(password: &str, hash: &str) -> StorageResult<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| StorageError::password_hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct-horse-battery-staple").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct-horse-battery-staple", &hash).unwrap());
        assert!(!verify_password("Tr0ub4dor&3", &hash).unwrap());
    }

    #[test]
    fn test_salted() {
        assert_ne!(hash_password("pw").unwrap(), hash_password("pw").unwrap());
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(verify_password("pw", "not-a-phc-string").is_err());
    }
}
