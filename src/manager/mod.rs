pub mod health;

pub use health::{HealthReport, ShardHealth};

use crate::connection::config::{PoolConfig, ShardSetConfig, redact_target};
use crate::connection::pool::{PgConnector, PgPool};
use crate::connection::{PoolConnector, ShardPool};
use crate::core::{Result, ShardError, ShardKey};
use crate::routing::{DefaultRouter, ShardRouter, validate_index};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

/// Lifecycle state of a [`ShardManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Ready,
    /// Terminal; lookups and health checks fail with `ManagerClosed`.
    Closed,
}

/// Routes keys to a fixed, ordered set of shard pools
///
/// The shard set is fixed at construction: shard `i` is the pool opened for target `i`.
/// The manager is a lookup service, not a proxy: callers resolve a key to a pool and run
/// their queries against that pool directly.
///
/// The active routing strategy sits behind a single mutex. A lookup clones the current
/// strategy under the lock and runs it outside, so a concurrent replacement is observed
/// either entirely or not at all.
pub struct ShardManager<P: ShardPool = PgPool> {
    shards: Vec<Arc<P>>,
    num_shards: usize,
    router: Mutex<Arc<dyn ShardRouter>>,
    closed: AtomicBool,
}

impl<P: ShardPool> ShardManager<P> {
    /// Open one pool per target, in order
    ///
    /// Fails on the first target that cannot be opened. Pools already opened for earlier
    /// targets are closed before the error is returned.
    pub async fn connect<I, C>(targets: I, connector: &C) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        C: PoolConnector<Pool = P>,
    {
        let targets: Vec<String> = targets
            .into_iter()
            .map(|t| t.as_ref().to_string())
            .collect();

        let mut shards = Vec::with_capacity(targets.len());
        for (index, target) in targets.iter().enumerate() {
            match connector.connect(target).await {
                Ok(pool) => shards.push(Arc::new(pool)),
                Err(source) => {
                    let target = redact_target(target);
                    warn!(index, shard = %target, error = %source, "shard connection failed");
                    release_opened(&shards).await;
                    return Err(ShardError::ConnectFailure {
                        index,
                        target,
                        source: Box::new(source),
                    });
                }
            }
        }

        debug!(num_shards = shards.len(), "shard manager ready");
        Ok(Self::from_pools(shards))
    }

    /// Wrap pools that are already open, in shard order.
    pub fn from_pools(shards: Vec<Arc<P>>) -> Self {
        Self {
            num_shards: shards.len(),
            shards,
            router: Mutex::new(Arc::new(DefaultRouter)),
            closed: AtomicBool::new(false),
        }
    }

    /// Replace the routing strategy
    ///
    /// Lookups issued after this returns use `router`. Lookups already in flight may
    /// finish with the previous strategy.
    pub fn set_routing_strategy<R>(&self, router: R)
    where
        R: ShardRouter + 'static,
    {
        let router: Arc<dyn ShardRouter> = Arc::new(router);
        let name = router.name().to_string();
        *self.router.lock().unwrap_or_else(PoisonError::into_inner) = router;
        debug!(strategy = %name, "routing strategy replaced");
    }

    /// Reinstall [`DefaultRouter`].
    pub fn reset_routing_strategy(&self) {
        self.set_routing_strategy(DefaultRouter);
    }

    pub fn routing_strategy_name(&self) -> String {
        self.active_router().name().to_string()
    }

    fn active_router(&self) -> Arc<dyn ShardRouter> {
        // The guarded value is a single Arc; a panic elsewhere cannot leave it torn.
        self.router
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Index of the shard that owns `key`.
    pub fn shard_index(&self, key: impl Into<ShardKey>) -> Result<usize> {
        self.ensure_ready()?;
        if self.num_shards == 0 {
            return Err(ShardError::NoShards);
        }

        let key = key.into();
        let router = self.active_router();
        let index = router.shard_index(&key, self.num_shards)?;
        validate_index(index, self.num_shards)
    }

    /// Pool of the shard that owns `key`.
    pub fn resolve_shard(&self, key: impl Into<ShardKey>) -> Result<Arc<P>> {
        let index = self.shard_index(key)?;
        Ok(Arc::clone(&self.shards[index]))
    }

    /// Pool at a known shard index.
    pub fn shard(&self, index: usize) -> Result<Arc<P>> {
        self.ensure_ready()?;
        self.shards
            .get(index)
            .cloned()
            .ok_or(ShardError::ShardIndexOutOfRange {
                index: i64::try_from(index).unwrap_or(i64::MAX),
                num_shards: self.num_shards,
            })
    }

    /// Every shard pool, in construction order.
    pub fn all_shards(&self) -> Vec<Arc<P>> {
        self.shards.clone()
    }

    pub fn num_shards(&self) -> usize {
        self.num_shards
    }

    pub fn state(&self) -> ManagerState {
        if self.closed.load(Ordering::SeqCst) {
            ManagerState::Closed
        } else {
            ManagerState::Ready
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ManagerState::Closed
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            ManagerState::Ready => Ok(()),
            ManagerState::Closed => Err(ShardError::ManagerClosed),
        }
    }

    /// Ping every shard concurrently
    ///
    /// Returns the failure of the lowest-indexed unreachable shard. Use
    /// [`health_check`](Self::health_check) to see every failing shard.
    pub async fn ping_all(&self) -> Result<()> {
        self.ensure_ready()?;

        let results = join_all(self.shards.iter().map(|shard| shard.ping())).await;
        for (index, result) in results.into_iter().enumerate() {
            result.map_err(|err| ShardError::unreachable(index, err))?;
        }
        Ok(())
    }

    /// Ping every shard concurrently and report each outcome.
    pub async fn health_check(&self) -> Result<HealthReport> {
        self.ensure_ready()?;

        let checks = self.shards.iter().enumerate().map(|(index, shard)| async move {
            let started = Instant::now();
            let result = shard.ping().await;
            ShardHealth {
                index,
                target: shard.describe(),
                latency: started.elapsed(),
                error: result.err().map(|err| err.to_string()),
            }
        });

        Ok(HealthReport {
            shards: join_all(checks).await,
        })
    }

    /// Close every shard pool
    ///
    /// All pools are closed even if some fail; the failure of the lowest-indexed shard
    /// is returned. The manager is `Closed` afterwards regardless. Calling this again is
    /// a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let results = join_all(self.shards.iter().map(|shard| shard.close())).await;
        let mut first_failure = None;
        for (index, result) in results.into_iter().enumerate() {
            if let Err(err) = result {
                warn!(index, error = %err, "failed to close shard");
                first_failure.get_or_insert(ShardError::close_failure(index, err));
            }
        }

        debug!(num_shards = self.num_shards, "shard manager closed");
        first_failure.map_or(Ok(()), Err)
    }
}

impl ShardManager<PgPool> {
    /// Connect to Postgres shards with the default [`PoolConfig`].
    pub async fn new<I>(targets: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self::with_pool_config(targets, PoolConfig::default()).await
    }

    pub async fn with_pool_config<I>(targets: I, config: PoolConfig) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        config.validate()?;
        Self::connect(targets, &PgConnector::new(config)).await
    }

    pub async fn from_config(config: &ShardSetConfig) -> Result<Self> {
        Self::with_pool_config(&config.targets, config.pool_config()).await
    }
}

impl<P: ShardPool> std::fmt::Debug for ShardManager<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardManager")
            .field("num_shards", &self.num_shards)
            .field("strategy", &self.routing_strategy_name())
            .field("state", &self.state())
            .finish()
    }
}

/// Close pools opened before a construction failure, newest first.
async fn release_opened<P: ShardPool>(shards: &[Arc<P>]) {
    for (index, shard) in shards.iter().enumerate().rev() {
        if let Err(err) = shard.close().await {
            warn!(index, error = %err, "failed to release shard after construction failure");
        }
    }
}
