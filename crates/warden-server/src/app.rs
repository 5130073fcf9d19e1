//! Service wiring.
//!
//! Builds the token issuer, the session cache with its health monitor, the
//! PostgreSQL repository and the orchestrator from an [`AppConfig`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};
use uuid::Uuid;
use warden_auth::{AuthOrchestrator, OrchestratorConfig, SessionKeys, TokenIssuer};
use warden_auth_postgres::PostgresAuthStorage;
use warden_cache::{
    CacheBackend, CacheHealthMonitor, HealthMonitorConfig, HealthMonitorHandle,
    LocalCacheBackend, RedisCacheBackend, SessionStore,
};

use crate::config::{AppConfig, RedisConfig};

/// Running services. Drop order does not matter; call [`Services::shutdown`]
/// to stop background work cleanly.
pub struct Services {
    pub orchestrator: Arc<AuthOrchestrator>,
    pub cache: Arc<SessionStore>,
    pub storage: PostgresAuthStorage,
    monitor: HealthMonitorHandle,
}

impl Services {
    pub fn monitor(&self) -> &HealthMonitorHandle {
        &self.monitor
    }

    /// Stops the health monitor, waiting at most `timeout` for an in-flight
    /// tick, then closes the database pool.
    pub async fn shutdown(self, timeout: Duration) {
        if tokio::time::timeout(timeout, self.monitor.shutdown())
            .await
            .is_err()
        {
            warn!(?timeout, "Health monitor did not stop in time");
        }
        self.storage.pool().close().await;
        info!("Services stopped");
    }
}

/// Builds the session cache backend.
///
/// An unreachable Redis is not fatal: the pool connects lazily and the store
/// starts out unavailable until the health monitor reconnects it.
pub fn create_cache_backend(config: &RedisConfig) -> Result<Arc<dyn CacheBackend>> {
    if !config.enabled {
        info!("Redis disabled, using in-process session cache");
        return Ok(Arc::new(LocalCacheBackend::new()));
    }

    info!(url = %config.url, "Using Redis session cache");
    let timeout = Duration::from_millis(config.timeout_ms);
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    redis_config.pool = Some(pool_config);
    let pool = redis_config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .context("invalid Redis configuration")?;

    Ok(Arc::new(RedisCacheBackend::new(pool)))
}

/// Wires every service and starts the cache health monitor.
///
/// # Errors
///
/// Fails on invalid auth or Redis configuration, or an unparseable database
/// URL. Unreachable stores are logged and tolerated.
pub async fn build(config: &AppConfig) -> Result<Services> {
    let issuer = Arc::new(TokenIssuer::new(&config.auth).context("invalid auth configuration")?);

    let backend = create_cache_backend(&config.redis)?;
    let cache = Arc::new(SessionStore::new(backend));
    if let Err(e) = cache.probe().await {
        warn!(error = %e, "Session cache unreachable at startup");
        cache.mark_unavailable();
    }

    let instance = config
        .server
        .instance_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let keys = SessionKeys::new(config.auth.session_cache.key_prefix.clone());
    let monitor_config = HealthMonitorConfig::default()
        .with_health_check_interval(config.auth.session_cache.health_check_interval)
        .with_reconnection_interval(config.auth.session_cache.reconnection_interval)
        .with_health_key(keys.health(&instance));
    let monitor = Arc::new(CacheHealthMonitor::new(cache.clone(), monitor_config)).start();

    let storage = PostgresAuthStorage::connect_lazy(
        &config.database.connection_url(),
        config.database.pool_size,
        config.database.acquire_timeout(),
    )
    .context("invalid database configuration")?;
    if config.database.ensure_schema
        && let Err(e) = storage.ensure_schema().await
    {
        warn!(error = %e, "Could not ensure auth schema; continuing");
    }

    let verifier = storage
        .credential_verifier()
        .context("failed to initialize credential verifier")?;
    let orchestrator = Arc::new(AuthOrchestrator::new(
        issuer,
        cache.clone(),
        Arc::new(storage.session_repository()),
        Arc::new(storage.principal_storage()),
        Arc::new(verifier),
        OrchestratorConfig::from_auth_config(&config.auth),
    ));

    info!(
        instance = %instance,
        cache_backend = cache.backend_name(),
        cache_available = cache.is_available(),
        "Services ready"
    );

    Ok(Services {
        orchestrator,
        cache,
        storage,
        monitor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_backend_when_redis_disabled() {
        let backend = create_cache_backend(&RedisConfig::default()).unwrap();
        assert_eq!(backend.name(), "local");
    }

    #[tokio::test]
    async fn test_redis_backend_is_lazy() {
        let config = RedisConfig {
            enabled: true,
            url: "redis://127.0.0.1:1".to_string(),
            timeout_ms: 100,
            ..RedisConfig::default()
        };
        let backend = create_cache_backend(&config).unwrap();
        assert_eq!(backend.name(), "redis");
        assert!(backend.ping().await.is_err());
    }

    #[test]
    fn test_malformed_redis_url_rejected() {
        let config = RedisConfig {
            enabled: true,
            url: "not a url".to_string(),
            ..RedisConfig::default()
        };
        assert!(create_cache_backend(&config).is_err());
    }
}
