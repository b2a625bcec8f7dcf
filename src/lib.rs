// ============================================================================
// pgshard: client-side sharding over Postgres connection pools
// ============================================================================

//! Route application keys to a fixed set of database shards.
//!
//! ```no_run
//! use pgshard::{ShardKey, ShardManager, ShardPool, ShardRouter};
//!
//! # async fn run() -> pgshard::Result<()> {
//! let manager = ShardManager::new([
//!     "host=db0 user=app dbname=orders",
//!     "host=db1 user=app dbname=orders",
//!     "host=db2 user=app dbname=orders",
//! ])
//! .await?;
//!
//! // 7 mod 3 = 1: the second shard
//! let pool = manager.resolve_shard(7)?;
//! let conn = pool.get_connection().await?;
//! conn.execute("INSERT INTO orders (id) VALUES ($1)", &[&7i64]).await?;
//!
//! // Text keys route by CRC-32 of their bytes
//! let pool = manager.resolve_shard("user-42")?;
//! pool.ping().await?;
//!
//! // Custom strategy: everything below 1000 lives on shard 0
//! manager.set_routing_strategy(|key: &ShardKey, n: usize| match key {
//!     ShardKey::Int(id) if *id < 1000 => Ok(0),
//!     other => pgshard::DefaultRouter.shard_index(other, n),
//! });
//!
//! manager.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod core;
pub mod manager;
pub mod routing;

pub use crate::core::{Result, ShardError, ShardKey};

pub use connection::{
    PoolConnector, ShardPool,
    config::{PoolConfig, PoolSettings, ShardSetConfig, redact_target},
    pool::{PgConnector, PgPool, PoolGuard, PoolStats},
};

pub use manager::{HealthReport, ManagerState, ShardHealth, ShardManager};
pub use routing::{DefaultRouter, ShardRouter};
