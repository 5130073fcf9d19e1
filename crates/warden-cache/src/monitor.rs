//! Background health monitor for the session cache.
//!
//! A single spawned task checks the [`SessionStore`] on a fixed schedule:
//!
//! - while the store is **unavailable** it sends a lightweight probe every
//!   `reconnection_interval`; success marks the store available again
//! - while the store is **available** it runs a synthetic write/read/delete
//!   cycle every `health_check_interval` against a dedicated key; any fault or
//!   mismatch marks the store unavailable
//!
//! Retries use a fixed interval. There is no exponential backoff.
//!
//! # Overlap
//!
//! Ticks run sequentially inside one loop, and [`CacheHealthMonitor::check_once`]
//! additionally holds a busy guard, so a manual check racing the loop is
//! skipped rather than run twice. The guard is released on drop, so a tick
//! cancelled mid-flight does not block later ones.
//!
//! # Eviction
//!
//! A healthy tick also asks the backend to evict expired entries. This keeps
//! the in-process backend bounded; Redis expires keys on its own.
//!
//! # Shutdown
//!
//! [`HealthMonitorHandle::shutdown`] signals the loop and waits for it to exit.
//! A tick that is already running is allowed to finish; no tick starts after
//! the signal is observed. Dropping the handle without calling `shutdown`
//! also stops the loop at its next wait.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::SessionStore;

/// Monitor timing and key configuration.
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Delay between synthetic cycles while the store is available.
    pub health_check_interval: Duration,
    /// Delay between probes while the store is unavailable.
    pub reconnection_interval: Duration,
    /// Key used by the synthetic cycle. Should be unique per instance.
    pub health_key: String,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(60),
            reconnection_interval: Duration::from_secs(60),
            health_key: format!("health:{}", uuid::Uuid::new_v4()),
        }
    }
}

impl HealthMonitorConfig {
    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    pub fn with_reconnection_interval(mut self, interval: Duration) -> Self {
        self.reconnection_interval = interval;
        self
    }

    pub fn with_health_key(mut self, key: impl Into<String>) -> Self {
        self.health_key = key.into();
        self
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Synthetic cycle passed.
    Healthy,
    /// Synthetic cycle failed; the store is now unavailable.
    OutageDetected,
    /// Probe succeeded; the store is available again.
    Recovered,
    /// Probe failed; the store stays unavailable.
    StillUnavailable,
    /// Another tick was in flight.
    Skipped,
}

/// Monitor counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthMonitorStats {
    pub ticks: u64,
    pub probes: u64,
    pub recoveries: u64,
    pub outages_detected: u64,
    pub skipped: u64,
}

/// Clears the busy flag when a tick ends, including when it is cancelled.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic health checker for a [`SessionStore`].
pub struct CacheHealthMonitor {
    store: Arc<SessionStore>,
    config: HealthMonitorConfig,
    busy: AtomicBool,
    ticks: AtomicU64,
    probes: AtomicU64,
    recoveries: AtomicU64,
    outages_detected: AtomicU64,
    skipped: AtomicU64,
}

impl CacheHealthMonitor {
    pub fn new(store: Arc<SessionStore>, config: HealthMonitorConfig) -> Self {
        Self {
            store,
            config,
            busy: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            probes: AtomicU64::new(0),
            recoveries: AtomicU64::new(0),
            outages_detected: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &HealthMonitorConfig {
        &self.config
    }

    pub fn stats(&self) -> HealthMonitorStats {
        HealthMonitorStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            probes: self.probes.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            outages_detected: self.outages_detected.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    /// Runs one health tick.
    pub async fn check_once(&self) -> TickOutcome {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            debug!("Cache health tick already in flight, skipping");
            return TickOutcome::Skipped;
        };

        self.ticks.fetch_add(1, Ordering::Relaxed);
        if self.store.is_available() {
            self.verify().await
        } else {
            self.reconnect().await
        }
    }

    async fn verify(&self) -> TickOutcome {
        let nonce = uuid::Uuid::new_v4().to_string();
        match self.store.self_test(&self.config.health_key, &nonce).await {
            Ok(()) => {
                let evicted = self.store.evict_expired().await;
                if evicted > 0 {
                    debug!(evicted, "Evicted expired cache entries");
                }
                TickOutcome::Healthy
            }
            Err(e) => {
                self.outages_detected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    key = %self.config.health_key,
                    error = %e,
                    "Cache health check failed"
                );
                TickOutcome::OutageDetected
            }
        }
    }

    async fn reconnect(&self) -> TickOutcome {
        self.probes.fetch_add(1, Ordering::Relaxed);
        match self.store.probe().await {
            Ok(_) => {
                self.recoveries.fetch_add(1, Ordering::Relaxed);
                TickOutcome::Recovered
            }
            Err(e) => {
                warn!(
                    error = %e,
                    retry_in_secs = self.config.reconnection_interval.as_secs(),
                    "Cache still unavailable"
                );
                TickOutcome::StillUnavailable
            }
        }
    }

    fn next_delay(&self) -> Duration {
        if self.store.is_available() {
            self.config.health_check_interval
        } else {
            self.config.reconnection_interval
        }
    }

    /// Spawns the monitor loop on the current tokio runtime.
    pub fn start(self: Arc<Self>) -> HealthMonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let monitor = Arc::clone(&self);

        let join = tokio::spawn(async move {
            info!(
                health_check_interval_secs = monitor.config.health_check_interval.as_secs(),
                reconnection_interval_secs = monitor.config.reconnection_interval.as_secs(),
                backend = monitor.store.backend_name(),
                "Cache health monitor started"
            );

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(monitor.next_delay()) => {
                        monitor.check_once().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("Cache health monitor shutting down");
                            break;
                        }
                    }
                }
            }
        });

        HealthMonitorHandle {
            shutdown_tx,
            join,
            monitor: self,
        }
    }
}

/// Handle to a running monitor loop.
pub struct HealthMonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
    monitor: Arc<CacheHealthMonitor>,
}

impl HealthMonitorHandle {
    pub fn stats(&self) -> HealthMonitorStats {
        self.monitor.stats()
    }

    /// Stops the loop, letting an in-flight tick complete.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "Cache health monitor task ended abnormally");
        }
    }
}
