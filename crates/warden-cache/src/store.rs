//! Fault-absorbing session cache.
//!
//! [`SessionStore`] sits on the hot path of every authenticated request. It
//! wraps a [`CacheBackend`] and converts every backend fault into a degraded
//! result, so callers never see a cache error:
//!
//! | Operation    | Unavailable / fault result |
//! |--------------|----------------------------|
//! | `get`        | `None` (miss)              |
//! | `set`        | no-op, returns `false`     |
//! | `remove`     | no-op, returns `false`     |
//! | `exists`     | `false`                    |
//! | `get_ttl`    | `None`                     |
//! | `set_expiry` | `false`                    |
//! | `increment`  | `0`                        |
//!
//! A miss while the store is unavailable means "unknown", not "absent";
//! callers must consult the persistent store. Recovery is driven by
//! [`CacheHealthMonitor`](crate::CacheHealthMonitor) through [`probe`] and
//! [`self_test`].
//!
//! [`probe`]: SessionStore::probe
//! [`self_test`]: SessionStore::self_test

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::backend::CacheBackend;
use crate::error::{CacheError, CacheResult};
use crate::health::{HealthSnapshot, HealthState};

/// Cache-backed key/value store with explicit availability tracking.
pub struct SessionStore {
    backend: Arc<dyn CacheBackend>,
    health: HealthState,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            health: HealthState::new(),
        }
    }

    /// Whether the backend is currently believed to be reachable.
    pub fn is_available(&self) -> bool {
        self.health.is_available()
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    /// Name of the wrapped backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Reads and decodes a value.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.is_available() {
            return None;
        }
        match self.backend.get(key).await {
            Ok(Some(bytes)) => match rmp_serde::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    // Stale or foreign payload; the backend itself is fine.
                    tracing::warn!(operation = "get", key = %key, error = %e, "Discarding undecodable cache value");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                self.record_fault("get", key, &e);
                None
            }
        }
    }

    /// Encodes and writes a value. Returns `true` if the write reached the backend.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        if !self.is_available() {
            return false;
        }
        let bytes = match rmp_serde::to_vec_named(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(operation = "set", key = %key, error = %e, "Failed to encode cache value");
                return false;
            }
        };
        match self.backend.set_ex(key, &bytes, ttl).await {
            Ok(()) => true,
            Err(e) => {
                self.record_fault("set", key, &e);
                false
            }
        }
    }

    /// Deletes a key. Returns `true` if the key existed.
    pub async fn remove(&self, key: &str) -> bool {
        if !self.is_available() {
            return false;
        }
        self.backend.del(key).await.unwrap_or_else(|e| {
            self.record_fault("remove", key, &e);
            false
        })
    }

    pub async fn exists(&self, key: &str) -> bool {
        if !self.is_available() {
            return false;
        }
        self.backend.exists(key).await.unwrap_or_else(|e| {
            self.record_fault("exists", key, &e);
            false
        })
    }

    /// Remaining lifetime of a key; `None` for missing keys, keys without an
    /// expiry, and while unavailable.
    pub async fn get_ttl(&self, key: &str) -> Option<Duration> {
        if !self.is_available() {
            return None;
        }
        self.backend.ttl(key).await.unwrap_or_else(|e| {
            self.record_fault("get_ttl", key, &e);
            None
        })
    }

    /// Resets the lifetime of an existing key.
    pub async fn set_expiry(&self, key: &str, ttl: Duration) -> bool {
        if !self.is_available() {
            return false;
        }
        self.backend.expire(key, ttl).await.unwrap_or_else(|e| {
            self.record_fault("set_expiry", key, &e);
            false
        })
    }

    /// Atomically adds `delta` to a counter and returns the new value.
    ///
    /// Returns `0` while unavailable, so callers using counters as guards must
    /// treat `0` as "could not decide".
    pub async fn increment(&self, key: &str, delta: i64) -> i64 {
        if !self.is_available() {
            return 0;
        }
        self.backend.incr_by(key, delta).await.unwrap_or_else(|e| {
            self.record_fault("increment", key, &e);
            0
        })
    }

    /// Round-trip check that ignores the availability flag.
    ///
    /// On success the store is marked available again. Returns `true` if
    /// this call performed the transition.
    pub async fn probe(&self) -> CacheResult<bool> {
        self.backend.ping().await?;
        let recovered = self.health.mark_available();
        if recovered {
            tracing::info!(backend = self.backend.name(), "Session cache recovered");
        }
        Ok(recovered)
    }

    /// Drops expired entries from backends that keep them in memory.
    /// Returns the number removed; 0 while unavailable or on a fault.
    pub async fn evict_expired(&self) -> usize {
        if !self.is_available() {
            return 0;
        }
        self.backend.evict_expired().await.unwrap_or_else(|e| {
            self.record_fault("evict_expired", "*", &e);
            0
        })
    }

    /// Synthetic write/read/delete cycle against `key`, ignoring the
    /// availability flag.
    ///
    /// Catches partial failures that did not surface as a fault on the
    /// request path (for example writes silently dropped). Any error or
    /// mismatch marks the store unavailable.
    pub async fn self_test(&self, key: &str, nonce: &str) -> CacheResult<()> {
        let result = self.run_self_test(key, nonce).await;
        if let Err(e) = &result {
            self.record_fault("self_test", key, e);
        }
        result
    }

    async fn run_self_test(&self, key: &str, nonce: &str) -> CacheResult<()> {
        self.backend
            .set_ex(key, nonce.as_bytes(), Duration::from_secs(30))
            .await?;
        let read = self.backend.get(key).await?;
        if read.as_deref() != Some(nonce.as_bytes()) {
            return Err(CacheError::mismatch(format!(
                "wrote nonce to {key} but read back {}",
                if read.is_some() { "a different value" } else { "nothing" }
            )));
        }
        if !self.backend.del(key).await? {
            return Err(CacheError::mismatch(format!(
                "health key {key} vanished before delete"
            )));
        }
        Ok(())
    }

    /// Marks the backend down.
    pub fn mark_unavailable(&self) -> bool {
        self.health.mark_unavailable()
    }

    fn record_fault(&self, operation: &'static str, key: &str, error: &CacheError) {
        tracing::warn!(
            operation,
            key = %key,
            backend = self.backend.name(),
            error = %error,
            "Session cache operation failed"
        );
        if error.is_backend_fault() && self.health.mark_unavailable() {
            tracing::warn!(
                backend = self.backend.name(),
                "Session cache marked unavailable; serving degraded results"
            );
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("backend", &self.backend.name())
            .field("health", &self.health)
            .finish()
    }
}
