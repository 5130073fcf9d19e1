//! Opaque token generation and hashing.
//!
//! Refresh and password-reset tokens carry no structure. Only their SHA-256
//! hash is ever stored; the plaintext leaves the process once, in the
//! response that issued it.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Generate a cryptographically secure random token.
///
/// Returns a 256-bit random value encoded as base64url (43 characters).
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hash a token value using SHA-256, hex encoded.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Short, log-safe prefix of a token hash.
#[must_use]
pub fn hash_prefix(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
