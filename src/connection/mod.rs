pub mod config;
pub mod pool;

use crate::core::Result;
use async_trait::async_trait;

/// A connection pool to one physical database instance.
///
/// The shard manager only needs liveness and shutdown; query execution stays with the
/// concrete pool type, which callers use directly after resolving a shard.
#[async_trait]
pub trait ShardPool: Send + Sync + 'static {
    /// Check that the database behind the pool answers.
    async fn ping(&self) -> Result<()>;

    /// Release the pool's connections.
    ///
    /// Calling this more than once must not panic.
    async fn close(&self) -> Result<()>;

    /// Human-readable identity of the target, with secrets removed.
    fn describe(&self) -> String;
}

/// Opens a [`ShardPool`] for a connection target.
#[async_trait]
pub trait PoolConnector: Send + Sync {
    type Pool: ShardPool;

    /// Connect eagerly: an unreachable target must fail here, not on first use.
    async fn connect(&self, target: &str) -> Result<Self::Pool>;
}
