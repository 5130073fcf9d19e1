//! In-process cache backend on top of `DashMap`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::CacheBackend;
use crate::error::{CacheError, CacheResult};

/// A cached value with optional TTL.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Vec<u8>,
    pub cached_at: Instant,
    pub ttl: Option<Duration>,
}

impl CachedEntry {
    /// Create a new cached entry.
    pub fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            data,
            cached_at: Instant::now(),
            ttl,
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.ttl
            .map(|ttl| self.cached_at.elapsed() >= ttl)
            .unwrap_or(false)
    }

    /// Remaining lifetime, `None` when the entry never expires.
    pub fn remaining(&self) -> Option<Duration> {
        self.ttl.map(|ttl| ttl.saturating_sub(self.cached_at.elapsed()))
    }
}

/// Single-instance cache backend.
///
/// Entries live in process memory and are lost on restart, so this backend
/// is only suitable for development, single-instance deployments and tests.
/// Expired entries are dropped lazily on access or by [`purge_expired`],
/// which the health monitor runs on every healthy tick.
///
/// [`purge_expired`]: LocalCacheBackend::purge_expired
#[derive(Default)]
pub struct LocalCacheBackend {
    entries: DashMap<String, CachedEntry>,
}

impl LocalCacheBackend {
    /// Create an empty local backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all expired entries. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }

    fn live(&self, key: &str) -> Option<CachedEntry> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.clone())
    }
}

#[async_trait]
impl CacheBackend for LocalCacheBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.live(key).map(|entry| entry.data))
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.entries
            .insert(key.to_string(), CachedEntry::new(value.to_vec(), Some(ttl)));
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<bool> {
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired()))
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.live(key).is_some())
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        Ok(self.live(key).and_then(|entry| entry.remaining()))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.cached_at = Instant::now();
                entry.ttl = Some(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn incr_by(&self, key: &str, delta: i64) -> CacheResult<i64> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(CachedEntry::new(delta.to_string().into_bytes(), None));
                    return Ok(delta);
                }
                let current = std::str::from_utf8(&occupied.get().data)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| CacheError::command("value is not an integer"))?;
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| CacheError::command("increment would overflow"))?;
                occupied.get_mut().data = next.to_string().into_bytes();
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CachedEntry::new(delta.to_string().into_bytes(), None));
                Ok(delta)
            }
        }
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }

    async fn evict_expired(&self) -> CacheResult<usize> {
        Ok(self.purge_expired())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_del() {
        let backend = LocalCacheBackend::new();
        backend
            .set_ex("k", b"value", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(backend.get("k").await.unwrap(), Some(b"value".to_vec()));
        assert!(backend.exists("k").await.unwrap());
        assert!(backend.del("k").await.unwrap());
        assert!(!backend.del("k").await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_invisible() {
        let backend = LocalCacheBackend::new();
        backend
            .set_ex("short", b"v", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(backend.get("short").await.unwrap(), None);
        assert!(!backend.exists("short").await.unwrap());
        assert_eq!(backend.ttl("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_and_expire() {
        let backend = LocalCacheBackend::new();
        backend
            .set_ex("k", b"v", Duration::from_secs(60))
            .await
            .unwrap();

        let ttl = backend.ttl("k").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(60));
        assert!(ttl > Duration::from_secs(55));

        assert!(backend.expire("k", Duration::from_secs(600)).await.unwrap());
        let ttl = backend.ttl("k").await.unwrap().unwrap();
        assert!(ttl > Duration::from_secs(595));

        assert!(!backend.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_by() {
        let backend = LocalCacheBackend::new();
        assert_eq!(backend.incr_by("counter", 1).await.unwrap(), 1);
        assert_eq!(backend.incr_by("counter", 4).await.unwrap(), 5);
        assert_eq!(backend.incr_by("counter", -2).await.unwrap(), 3);

        // Counters have no TTL until one is set
        assert_eq!(backend.ttl("counter").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_by_rejects_non_integer() {
        let backend = LocalCacheBackend::new();
        backend
            .set_ex("text", b"hello", Duration::from_secs(60))
            .await
            .unwrap();

        let err = backend.incr_by("text", 1).await.unwrap_err();
        assert!(matches!(err, CacheError::Command { .. }));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = LocalCacheBackend::new();
        backend
            .set_ex("a", b"1", Duration::from_millis(5))
            .await
            .unwrap();
        backend
            .set_ex("b", b"2", Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(backend.purge_expired(), 1);
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_evict_expired_via_trait() {
        let backend: Box<dyn CacheBackend> = Box::new(LocalCacheBackend::new());
        backend
            .set_ex("tombstone", b"x", Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(backend.evict_expired().await.unwrap(), 1);
        assert_eq!(backend.evict_expired().await.unwrap(), 0);
    }
}
