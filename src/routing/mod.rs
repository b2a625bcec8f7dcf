//! Key-to-shard routing strategies.
//!
//! A strategy maps a [`ShardKey`] and a shard count to a shard index. The index is
//! signed so that a faulty strategy returning a negative value can be detected and
//! rejected by the manager instead of wrapping around.

pub mod shard_hash;

pub use shard_hash::{DefaultRouter, crc32_shard_for, int_shard_for};

use crate::core::{Result, ShardError, ShardKey};

/// Pluggable routing strategy.
///
/// Implementations must be pure: the same key and shard count always produce the same
/// index. The manager never calls a strategy with a shard count of zero.
pub trait ShardRouter: Send + Sync {
    fn shard_index(&self, key: &ShardKey, shard_count: usize) -> Result<i64>;

    /// Short label used in diagnostics.
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> ShardRouter for F
where
    F: Fn(&ShardKey, usize) -> Result<i64> + Send + Sync,
{
    fn shard_index(&self, key: &ShardKey, shard_count: usize) -> Result<i64> {
        self(key, shard_count)
    }
}

/// Checks a strategy result against `[0, num_shards)`.
pub(crate) fn validate_index(index: i64, num_shards: usize) -> Result<usize> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < num_shards)
        .ok_or(ShardError::ShardIndexOutOfRange { index, num_shards })
}
