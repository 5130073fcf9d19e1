//! Resilient session cache for warden.
//!
//! This crate provides:
//!
//! - [`CacheBackend`] implementations for Redis and in-process storage
//! - [`SessionStore`], a typed key/value layer that never returns an error and
//!   degrades to misses and no-ops while its backend is down
//! - [`CacheHealthMonitor`], a background task that detects outages the
//!   request path did not see and brings the store back once the backend
//!   answers again
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use warden_cache::{
//!     CacheHealthMonitor, HealthMonitorConfig, LocalCacheBackend, SessionStore,
//! };
//!
//! # async fn run() {
//! let store = Arc::new(SessionStore::new(Arc::new(LocalCacheBackend::new())));
//! let monitor = Arc::new(CacheHealthMonitor::new(
//!     store.clone(),
//!     HealthMonitorConfig::default(),
//! ));
//! let handle = monitor.start();
//!
//! store.set("greeting", &"hello", std::time::Duration::from_secs(60)).await;
//! let value: Option<String> = store.get("greeting").await;
//!
//! handle.shutdown().await;
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod health;
pub mod monitor;
pub mod store;

pub use backend::{CacheBackend, CachedEntry, LocalCacheBackend, RedisCacheBackend};
pub use error::{CacheError, CacheResult};
pub use health::{HealthSnapshot, HealthState};
pub use monitor::{
    CacheHealthMonitor, HealthMonitorConfig, HealthMonitorHandle, HealthMonitorStats, TickOutcome,
};
pub use store::SessionStore;
