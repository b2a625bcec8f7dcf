use super::config::{PoolConfig, redact_target};
use super::{PoolConnector, ShardPool};
use crate::core::{Result, ShardError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

/// Connection pool for one Postgres shard
///
/// Keeps up to `max_connections` `tokio_postgres` clients for a single target and hands
/// them out through [`PoolGuard`].
pub struct PgPool {
    /// Pool configuration
    config: PoolConfig,
    /// Parsed connection target
    pg_config: tokio_postgres::Config,
    /// Target with the password masked
    target: String,
    /// Idle connections
    available: Arc<Mutex<VecDeque<PooledConnection>>>,
    /// Connections currently open (idle + checked out)
    total_connections: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

/// A connection held by the pool
#[derive(Debug)]
struct PooledConnection {
    client: Client,
    created_at: Instant,
    last_used: Instant,
}

impl PooledConnection {
    fn new(client: Client) -> Self {
        let now = Instant::now();
        Self {
            client,
            created_at: now,
            last_used: now,
        }
    }

    fn is_reusable(&self, config: &PoolConfig, now: Instant) -> bool {
        !self.client.is_closed()
            && !outlived(self.created_at, now, config.max_lifetime)
            && !idle_too_long(self.last_used, now, config.idle_timeout)
    }
}

/// Parse a target, filling in the pool's connect timeout unless the target sets its own.
fn parse_target(target: &str, config: &PoolConfig) -> Result<tokio_postgres::Config> {
    let mut pg_config: tokio_postgres::Config = target.parse()?;
    if pg_config.get_connect_timeout().is_none() {
        pg_config.connect_timeout(config.connect_timeout);
    }
    Ok(pg_config)
}

/// Whether a connection opened at `created_at` is past `max_lifetime` at `now`.
fn outlived(created_at: Instant, now: Instant, max_lifetime: Option<Duration>) -> bool {
    max_lifetime.is_some_and(|lifetime| now.saturating_duration_since(created_at) > lifetime)
}

/// Whether a connection last returned at `last_used` has sat idle past `idle_timeout`.
fn idle_too_long(last_used: Instant, now: Instant, idle_timeout: Option<Duration>) -> bool {
    idle_timeout.is_some_and(|timeout| now.saturating_duration_since(last_used) > timeout)
}

impl PgPool {
    /// Create a pool and eagerly open its first connections
    ///
    /// `target` is anything `tokio_postgres::Config` parses: a key/value string
    /// (`host=db0 user=app dbname=orders`) or a URL (`postgres://app@db0/orders`).
    pub async fn connect(target: &str, config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let pg_config = parse_target(target, &config)?;

        let pool = Self {
            config,
            pg_config,
            target: redact_target(target),
            available: Arc::new(Mutex::new(VecDeque::new())),
            total_connections: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        };

        // Pre-create minimum connections; one at least, so a dead target fails here
        pool.ensure_min_connections().await?;
        debug!(shard = %pool.target, "opened shard pool");

        Ok(pool)
    }

    /// Get a connection from the pool
    pub async fn get_connection(&self) -> Result<PoolGuard> {
        let start = Instant::now();

        loop {
            if self.is_closed() {
                return Err(ShardError::PoolClosed);
            }

            if let Some(pooled) = self.try_get_available().await {
                return Ok(self.guard(pooled.client, pooled.created_at));
            }

            if let Some(client) = self.try_create_connection().await? {
                return Ok(self.guard(client, Instant::now()));
            }

            if start.elapsed() > self.config.acquire_timeout {
                return Err(ShardError::PoolTimeout(self.config.acquire_timeout));
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn guard(&self, client: Client, created_at: Instant) -> PoolGuard {
        PoolGuard {
            client: Some(client),
            created_at,
            pool: Arc::clone(&self.available),
            total_connections: Arc::clone(&self.total_connections),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Pop an idle connection, discarding stale ones on the way
    async fn try_get_available(&self) -> Option<PooledConnection> {
        let mut available = self.available.lock().await;

        let now = Instant::now();
        let mut kept = VecDeque::with_capacity(available.len());
        let mut removed = 0usize;
        while let Some(pooled) = available.pop_front() {
            if pooled.is_reusable(&self.config, now) {
                kept.push_back(pooled);
            } else {
                removed += 1;
            }
        }
        *available = kept;

        if removed > 0 {
            self.total_connections.fetch_sub(removed, Ordering::SeqCst);
            debug!(shard = %self.target, removed, "discarded stale connections");
        }

        available.pop_front()
    }

    /// Open a new connection if under limit
    async fn try_create_connection(&self) -> Result<Option<Client>> {
        let reserved = self
            .total_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| {
                (total < self.config.max_connections).then_some(total + 1)
            });
        if reserved.is_err() {
            return Ok(None);
        }

        match self.open_client().await {
            Ok(client) => Ok(Some(client)),
            Err(err) => {
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    async fn open_client(&self) -> Result<Client> {
        let timeout = self.connect_timeout();
        let connecting = self.pg_config.connect(NoTls);
        let (client, connection) = tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| ShardError::PoolTimeout(timeout))??;

        let target = self.target.clone();
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!(shard = %target, error = %err, "postgres connection terminated");
            }
        });

        Ok(client)
    }

    /// Ensure minimum number of connections
    async fn ensure_min_connections(&self) -> Result<()> {
        let wanted = self.config.min_connections.max(1);
        let mut opened = Vec::with_capacity(wanted);
        for _ in 0..wanted {
            opened.push(PooledConnection::new(self.open_client().await?));
        }

        let mut available = self.available.lock().await;
        self.total_connections.fetch_add(opened.len(), Ordering::SeqCst);
        available.extend(opened);

        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Effective timeout for opening one connection.
    pub fn connect_timeout(&self) -> Duration {
        self.pg_config
            .get_connect_timeout()
            .copied()
            .unwrap_or(self.config.connect_timeout)
    }

    /// Redacted connection target
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Get pool statistics
    pub async fn stats(&self) -> PoolStats {
        let available = self.available.lock().await;
        let total = self.total_connections.load(Ordering::SeqCst);

        PoolStats {
            total_connections: total,
            available_connections: available.len(),
            active_connections: total.saturating_sub(available.len()),
            max_connections: self.config.max_connections,
        }
    }
}

#[async_trait]
impl ShardPool for PgPool {
    async fn ping(&self) -> Result<()> {
        let conn = self.get_connection().await?;
        conn.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut available = self.available.lock().await;
        let idle = available.len();
        available.clear();
        self.total_connections.fetch_sub(idle, Ordering::SeqCst);
        debug!(shard = %self.target, idle, "closed shard pool");

        Ok(())
    }

    fn describe(&self) -> String {
        self.target.clone()
    }
}

/// Opens [`PgPool`]s with a shared [`PoolConfig`].
#[derive(Debug, Clone, Default)]
pub struct PgConnector {
    config: PoolConfig,
}

impl PgConnector {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PoolConnector for PgConnector {
    type Pool = PgPool;

    async fn connect(&self, target: &str) -> Result<PgPool> {
        PgPool::connect(target, self.config.clone()).await
    }
}

/// Connection pool statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Derefs to the `tokio_postgres` client; the client goes back to the pool on drop.
#[derive(Debug)]
pub struct PoolGuard {
    client: Option<Client>,
    created_at: Instant,
    pool: Arc<Mutex<VecDeque<PooledConnection>>>,
    total_connections: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl PoolGuard {
    pub fn client(&self) -> &Client {
        self
    }

    fn release(&mut self) -> Option<PooledConnection> {
        let client = self.client.take()?;
        if client.is_closed() || self.closed.load(Ordering::SeqCst) {
            self.total_connections.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        let mut pooled = PooledConnection::new(client);
        pooled.created_at = self.created_at;
        Some(pooled)
    }

    /// Return the connection to the pool, waiting for the pool lock if needed.
    pub async fn close(mut self) {
        if let Some(pooled) = self.release() {
            self.pool.lock().await.push_back(pooled);
        }
    }
}

impl Deref for PoolGuard {
    type Target = Client;

    fn deref(&self) -> &Client {
        self.client
            .as_ref()
            .expect("Connection already returned to pool")
    }
}

impl DerefMut for PoolGuard {
    fn deref_mut(&mut self) -> &mut Client {
        self.client
            .as_mut()
            .expect("Connection already returned to pool")
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        let Some(pooled) = self.release() else {
            return;
        };

        match self.pool.try_lock() {
            Ok(mut pool) => pool.push_back(pooled),
            // Contended: hand the return off to the runtime instead of dropping a live socket.
            Err(_) => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let pool = Arc::clone(&self.pool);
                    let total_connections = Arc::clone(&self.total_connections);
                    let closed = Arc::clone(&self.closed);
                    handle.spawn(async move {
                        let mut pool = pool.lock().await;
                        if closed.load(Ordering::SeqCst) {
                            total_connections.fetch_sub(1, Ordering::SeqCst);
                        } else {
                            pool.push_back(pooled);
                        }
                    });
                }
                Err(_) => {
                    warn!("guard dropped outside a runtime with the pool busy; discarding connection");
                    self.total_connections.fetch_sub(1, Ordering::SeqCst);
                }
            },
        }
    }
}
