//! Shared availability flag for the session cache.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use time::OffsetDateTime;

/// Availability of the cache backend as last observed.
///
/// Written by [`SessionStore`](crate::SessionStore) when an operation fails
/// and by [`CacheHealthMonitor`](crate::CacheHealthMonitor) when a probe
/// succeeds. Readers on any task see the latest write.
#[derive(Debug)]
pub struct HealthState {
    available: AtomicBool,
    changed_at: AtomicI64,
}

/// Point-in-time copy of [`HealthState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub available: bool,
    /// Unix timestamp of the last transition (or creation).
    pub changed_at: i64,
}

impl HealthState {
    /// Creates a state that starts out available.
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            changed_at: AtomicI64::new(OffsetDateTime::now_utc().unix_timestamp()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Flags the backend as unavailable.
    ///
    /// Returns `true` only for the caller that performed the transition, so
    /// an outage is logged once no matter how many operations fail together.
    pub fn mark_unavailable(&self) -> bool {
        let was_available = self.available.swap(false, Ordering::AcqRel);
        if was_available {
            self.touch();
        }
        was_available
    }

    /// Flags the backend as available. Returns `true` on transition.
    pub fn mark_available(&self) -> bool {
        let was_available = self.available.swap(true, Ordering::AcqRel);
        if !was_available {
            self.touch();
        }
        !was_available
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            available: self.is_available(),
            changed_at: self.changed_at.load(Ordering::Relaxed),
        }
    }

    fn touch(&self) {
        self.changed_at
            .store(OffsetDateTime::now_utc().unix_timestamp(), Ordering::Relaxed);
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}
