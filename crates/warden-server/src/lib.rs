//! Warden session service process.
//!
//! Loads [`config::AppConfig`], initialises tracing and wires the auth
//! services. The orchestrator is exposed to embedding transports through
//! [`app::Services`].

pub mod app;
pub mod config;
pub mod observability;

pub use app::Services;
