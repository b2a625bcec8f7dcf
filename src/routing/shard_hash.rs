use super::ShardRouter;
use crate::core::{Result, ShardError, ShardKey};

/// Routes an integer key by modulo, normalised into `[0, shard_count)`.
///
/// Negative keys use the Euclidean remainder, so `-1` lands on the last shard rather
/// than producing a negative index.
pub fn int_shard_for(key: i64, shard_count: usize) -> Result<i64> {
    if shard_count == 0 {
        return Err(ShardError::NoShards);
    }
    let index = i128::from(key).rem_euclid(shard_count as i128);
    // Only a shard count beyond i64::MAX can push the remainder out of range.
    i64::try_from(index).map_err(|_| ShardError::ShardIndexOutOfRange {
        index: key,
        num_shards: shard_count,
    })
}

/// Routes a byte key by IEEE CRC-32 of its bytes modulo `shard_count`.
///
/// The checksum is taken as an unsigned 32-bit value, so routing decisions match any
/// other implementation using the same polynomial.
pub fn crc32_shard_for(bytes: &[u8], shard_count: usize) -> Result<i64> {
    if shard_count == 0 {
        return Err(ShardError::NoShards);
    }
    let checksum = u64::from(crc32fast::hash(bytes));
    Ok((checksum % shard_count as u64) as i64)
}

/// The routing strategy installed when a manager is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultRouter;

impl ShardRouter for DefaultRouter {
    fn shard_index(&self, key: &ShardKey, shard_count: usize) -> Result<i64> {
        match key {
            ShardKey::Int(v) => int_shard_for(*v, shard_count),
            ShardKey::Text(bytes) => crc32_shard_for(bytes, shard_count),
            ShardKey::Unsupported(kind) => Err(ShardError::UnsupportedKeyType(kind.clone())),
        }
    }

    fn name(&self) -> &str {
        "default"
    }
}
