//! Pooled connection management with retry and backoff.
//!
//! Connections are pooled per `project:instance:database` key and reused
//! across tasks. A key shared by several tasks (the single target of a
//! consolidate mapping) hands out one entry whose internal mutex serializes
//! concurrent callers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Mutex;

use crate::config::ManagerConfig;
use crate::connector::{ConnectTarget, Connector, DatabaseInfo, ManagedConnection};
use crate::error::ConnectionError;

/// A pooled connection entry.
///
/// Owns the underlying link behind an async mutex; callers sharing the
/// entry take turns rather than racing on the driver.
pub struct PooledConnection {
    key: String,
    conn: Mutex<Box<dyn ManagedConnection>>,
    last_used: parking_lot::Mutex<Instant>,
    retries_used: u32,
}

impl PooledConnection {
    fn new(key: String, conn: Box<dyn ManagedConnection>, retries_used: u32) -> Self {
        Self {
            key,
            conn: Mutex::new(conn),
            last_used: parking_lot::Mutex::new(Instant::now()),
            retries_used,
        }
    }

    /// Pool key of this entry.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// How many retries were spent establishing this entry.
    pub fn retries_used(&self) -> u32 {
        self.retries_used
    }

    /// When the entry was last handed out or used.
    pub fn last_used(&self) -> Instant {
        *self.last_used.lock()
    }

    fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    /// Lightweight liveness probe.
    pub async fn ping(&self) -> Result<(), ConnectionError> {
        self.touch();
        self.conn.lock().await.ping().await
    }

    /// List databases on the connected instance.
    pub async fn list_databases(&self) -> Result<Vec<DatabaseInfo>, ConnectionError> {
        self.touch();
        self.conn.lock().await.list_databases().await
    }

    /// Whether the underlying link is still usable.
    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_connected()
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.conn.lock().await.close().await
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("key", &self.key)
            .field("retries_used", &self.retries_used)
            .finish()
    }
}

/// Pooled, retrying connection manager.
///
/// # Example
///
/// ```ignore
/// use dbferry_conn::{ConnectionManager, ManagerConfig};
///
/// let manager = ConnectionManager::new(connector, ManagerConfig::default());
/// let conn = manager.connect(&target).await?;
/// conn.ping().await?;
/// manager.close_all().await;
/// ```
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    config: ManagerConfig,
    pool: DashMap<String, Arc<PooledConnection>>,
}

impl ConnectionManager {
    /// Create a manager over the given connector.
    pub fn new(connector: Arc<dyn Connector>, config: ManagerConfig) -> Self {
        Self {
            connector,
            config,
            pool: DashMap::new(),
        }
    }

    /// Get a pooled connection for the target, creating it on a miss.
    ///
    /// Creation retries retryable failures up to `retry_attempts` times
    /// with exponential backoff; exhaustion surfaces as
    /// [`ConnectionError::RetriesExhausted`] wrapping the classified last
    /// error. Dead pooled entries are discarded and re-created.
    pub async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Arc<PooledConnection>, ConnectionError> {
        let key = target.pool_key();

        if let Some(entry) = self.pool.get(&key) {
            let entry = Arc::clone(&entry);
            if entry.is_connected().await {
                entry.touch();
                tracing::debug!(key = %key, "reusing pooled connection");
                return Ok(entry);
            }
            drop(entry);
            self.pool.remove(&key);
            tracing::debug!(key = %key, "discarded dead pooled connection");
        }

        let (conn, retries_used) = self.open_with_retry(target).await?;
        let entry = Arc::new(PooledConnection::new(key.clone(), conn, retries_used));
        self.pool.insert(key.clone(), Arc::clone(&entry));
        tracing::debug!(key = %key, retries_used, "opened new pooled connection");
        Ok(entry)
    }

    /// Pre-flight probe: connect and ping.
    pub async fn test_connection(&self, target: &ConnectTarget) -> Result<(), ConnectionError> {
        self.connect(target).await?.ping().await
    }

    /// List databases on the target instance, with size metadata.
    pub async fn list_databases(
        &self,
        target: &ConnectTarget,
    ) -> Result<Vec<DatabaseInfo>, ConnectionError> {
        self.connect(target).await?.list_databases().await
    }

    /// Close and drop one pooled entry. Idempotent: closing an absent or
    /// already-closed key is `Ok`.
    pub async fn close_connection(&self, key: &str) -> Result<(), ConnectionError> {
        if let Some((_, entry)) = self.pool.remove(key) {
            entry.close().await?;
            tracing::debug!(key = %key, "closed pooled connection");
        }
        Ok(())
    }

    /// Close and drop every pooled entry. Idempotent and best-effort: the
    /// pool is always left empty, and close failures are returned rather
    /// than raised so cleanup paths can downgrade them.
    pub async fn close_all(&self) -> Vec<ConnectionError> {
        let keys: Vec<String> = self.pool.iter().map(|e| e.key().clone()).collect();
        let mut failures = Vec::new();
        for key in keys {
            if let Err(e) = self.close_connection(&key).await {
                tracing::warn!(key = %key, error = %e, "failed to close pooled connection");
                failures.push(e);
            }
        }
        failures
    }

    /// Number of pooled entries.
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Whether a key currently has a pooled entry.
    pub fn contains(&self, key: &str) -> bool {
        self.pool.contains_key(key)
    }

    async fn open_with_retry(
        &self,
        target: &ConnectTarget,
    ) -> Result<(Box<dyn ManagedConnection>, u32), ConnectionError> {
        let mut attempt: u32 = 0;

        loop {
            let opened = tokio::time::timeout(self.config.connect_timeout, self.connector.open(target)).await;

            let err = match opened {
                Ok(Ok(conn)) => return Ok((conn, attempt)),
                Ok(Err(e)) => e.classified(target),
                Err(_) => ConnectionError::Timeout,
            };

            if !err.is_retryable() {
                tracing::warn!(key = %target.pool_key(), error = %err, "fatal connection error");
                return Err(err);
            }

            if attempt >= self.config.retry_attempts {
                return Err(ConnectionError::RetriesExhausted {
                    attempts: attempt + 1,
                    source: Box::new(err),
                });
            }

            attempt += 1;
            let delay = self.backoff_delay(attempt);
            tracing::warn!(
                key = %target.pool_key(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "connection attempt failed, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Exponential backoff with jitter: `base * 2^(attempt-1)`, capped.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_base_delay;
        let exp = base.saturating_mul(1u32 << (attempt - 1).min(16));
        let capped = exp.min(self.config.retry_max_delay);
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..=base / 2);
        capped + jitter
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("pooled", &self.pool.len())
            .field("retry_attempts", &self.config.retry_attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{ConnectionRole, Credentials};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct FlakyConnection {
        alive: AtomicBool,
        databases: Vec<DatabaseInfo>,
    }

    #[async_trait]
    impl ManagedConnection for FlakyConnection {
        async fn ping(&self) -> Result<(), ConnectionError> {
            if self.alive.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(ConnectionError::Transport("link dropped".to_string()))
            }
        }

        async fn list_databases(&self) -> Result<Vec<DatabaseInfo>, ConnectionError> {
            Ok(self.databases.clone())
        }

        fn is_connected(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn close(&self) -> Result<(), ConnectionError> {
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Connector that fails the first `fail_times` opens with the given
    /// message, then succeeds.
    struct FlakyConnector {
        fail_times: u32,
        failure: String,
        opens: AtomicU32,
    }

    impl FlakyConnector {
        fn new(fail_times: u32, failure: &str) -> Self {
            Self {
                fail_times,
                failure: failure.to_string(),
                opens: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        async fn open(
            &self,
            _target: &ConnectTarget,
        ) -> Result<Box<dyn ManagedConnection>, ConnectionError> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                return Err(ConnectionError::Transport(self.failure.clone()));
            }
            Ok(Box::new(FlakyConnection {
                alive: AtomicBool::new(true),
                databases: vec![
                    DatabaseInfo::new("orders", 4096),
                    DatabaseInfo::new("billing", 2048),
                ],
            }))
        }
    }

    fn target(database: &str) -> ConnectTarget {
        ConnectTarget::new(
            "acme-prod",
            "orders-db",
            database,
            ConnectionRole::Source,
            Credentials::new("migrator", "pw"),
        )
    }

    fn fast_config() -> ManagerConfig {
        ManagerConfig::new()
            .with_retry_attempts(3)
            .with_retry_base_delay(Duration::from_millis(1))
            .with_retry_max_delay(Duration::from_millis(4))
    }

    #[tokio::test]
    async fn test_retry_then_succeed() {
        let connector = Arc::new(FlakyConnector::new(2, "connection reset by peer"));
        let manager = ConnectionManager::new(Arc::clone(&connector) as Arc<dyn Connector>, fast_config());

        let conn = manager.connect(&target("orders")).await.unwrap();
        assert_eq!(conn.retries_used(), 2);
        assert_eq!(connector.opens.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let connector = Arc::new(FlakyConnector::new(10, "connection reset by peer"));
        let manager = ConnectionManager::new(connector as Arc<dyn Connector>, fast_config());

        let err = manager.connect(&target("orders")).await.unwrap_err();
        match err {
            ConnectionError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*source, ConnectionError::Transport(_)));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_error_skips_retries() {
        let connector = Arc::new(FlakyConnector::new(
            10,
            "FATAL: password authentication failed for user \"migrator\"",
        ));
        let manager =
            ConnectionManager::new(Arc::clone(&connector) as Arc<dyn Connector>, fast_config());

        let err = manager.connect(&target("orders")).await.unwrap_err();
        assert!(matches!(err, ConnectionError::AuthFailure { .. }));
        assert_eq!(connector.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pool_reuse() {
        let connector = Arc::new(FlakyConnector::new(0, ""));
        let manager =
            ConnectionManager::new(Arc::clone(&connector) as Arc<dyn Connector>, fast_config());

        let a = manager.connect(&target("orders")).await.unwrap();
        let b = manager.connect(&target("orders")).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(connector.opens.load(Ordering::SeqCst), 1);
        assert_eq!(manager.len(), 1);

        // Distinct database means a distinct pool entry.
        let c = manager.connect(&target("billing")).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test]
    async fn test_dead_entry_recreated() {
        let connector = Arc::new(FlakyConnector::new(0, ""));
        let manager =
            ConnectionManager::new(Arc::clone(&connector) as Arc<dyn Connector>, fast_config());

        let a = manager.connect(&target("orders")).await.unwrap();
        a.close().await.unwrap();

        let b = manager.connect(&target("orders")).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(connector.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_close_idempotent() {
        let connector = Arc::new(FlakyConnector::new(0, ""));
        let manager = ConnectionManager::new(connector as Arc<dyn Connector>, fast_config());

        let key = target("orders").pool_key();
        manager.connect(&target("orders")).await.unwrap();
        assert!(manager.contains(&key));

        manager.close_connection(&key).await.unwrap();
        manager.close_connection(&key).await.unwrap();
        assert!(!manager.contains(&key));

        assert!(manager.close_all().await.is_empty());
        assert!(manager.close_all().await.is_empty());
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_close_all_reports_failures_but_empties_pool() {
        struct StubbornConnection;

        #[async_trait]
        impl ManagedConnection for StubbornConnection {
            async fn ping(&self) -> Result<(), ConnectionError> {
                Ok(())
            }

            async fn list_databases(&self) -> Result<Vec<DatabaseInfo>, ConnectionError> {
                Ok(Vec::new())
            }

            fn is_connected(&self) -> bool {
                true
            }

            async fn close(&self) -> Result<(), ConnectionError> {
                Err(ConnectionError::Transport("close failed".to_string()))
            }
        }

        struct StubbornConnector;

        #[async_trait]
        impl Connector for StubbornConnector {
            async fn open(
                &self,
                _target: &ConnectTarget,
            ) -> Result<Box<dyn ManagedConnection>, ConnectionError> {
                Ok(Box::new(StubbornConnection))
            }
        }

        let manager =
            ConnectionManager::new(Arc::new(StubbornConnector) as Arc<dyn Connector>, fast_config());
        manager.connect(&target("orders")).await.unwrap();

        let failures = manager.close_all().await;
        assert_eq!(failures.len(), 1);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_list_databases() {
        let connector = Arc::new(FlakyConnector::new(0, ""));
        let manager = ConnectionManager::new(connector as Arc<dyn Connector>, fast_config());

        let dbs = manager.list_databases(&target("orders")).await.unwrap();
        assert_eq!(dbs.len(), 2);
        assert_eq!(dbs[0].name, "orders");
        assert_eq!(dbs[0].size_bytes, 4096);
    }

    #[tokio::test]
    async fn test_test_connection() {
        let connector = Arc::new(FlakyConnector::new(1, "connection reset by peer"));
        let manager = ConnectionManager::new(connector as Arc<dyn Connector>, fast_config());

        manager.test_connection(&target("orders")).await.unwrap();
    }
}
