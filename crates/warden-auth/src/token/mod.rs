//! Token issuance and validation.
//!
//! - [`jwt`]: HMAC-signed access tokens
//! - [`opaque`]: random refresh and reset tokens and their hashes
//! - [`TokenIssuer`]: lifetimes and validation policy on top of both

pub mod issuer;
pub mod jwt;
pub mod opaque;

pub use issuer::{IssuedAccessToken, InvalidTokenReason, TokenIssuer, TokenValidation};
pub use jwt::{AccessTokenClaims, JwtError, JwtService, SigningAlgorithm};
