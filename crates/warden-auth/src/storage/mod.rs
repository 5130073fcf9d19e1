//! Storage traits consumed by the auth flows.

mod credential;
mod principal;
mod session_repository;

pub use credential::CredentialVerifier;
pub use principal::PrincipalStorage;
pub use session_repository::{PersistentSessionRepository, RevokeOutcome};
