//! Raw cache backends.
//!
//! A [`CacheBackend`] is a thin byte-oriented key/value interface with TTL
//! support. Backends report every fault as a [`CacheError`]; deciding what a
//! fault means for callers is the job of [`SessionStore`](crate::SessionStore).
//!
//! # Implementations
//!
//! - [`RedisCacheBackend`] - shared cache over a `deadpool-redis` pool
//! - [`LocalCacheBackend`] - per-process `DashMap` cache for single-instance
//!   deployments and tests

mod local;
mod redis;

pub use self::local::{CachedEntry, LocalCacheBackend};
pub use self::redis::RedisCacheBackend;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CacheResult;

/// Byte-level cache operations.
///
/// Semantics follow Redis: `incr_by` on a missing key starts from zero,
/// `ttl` reports `None` for missing keys and keys without an expiry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Reads a value.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Writes a value with a time-to-live.
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Deletes a key. Returns `true` if the key existed.
    async fn del(&self, key: &str) -> CacheResult<bool>;

    /// Returns `true` if the key exists.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Returns the remaining time-to-live of a key.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Sets the time-to-live of an existing key. Returns `false` if the key
    /// does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Atomically adds `delta` to an integer value and returns the result.
    async fn incr_by(&self, key: &str, delta: i64) -> CacheResult<i64>;

    /// Lightweight round trip used to detect recovery.
    async fn ping(&self) -> CacheResult<()>;

    /// Drops expired entries the backend would otherwise keep in memory.
    /// Returns how many were removed. Redis expires keys itself.
    async fn evict_expired(&self) -> CacheResult<usize> {
        Ok(0)
    }

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
