use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShardError {
    #[error("Failed to connect to shard {index} ({target}): {source}")]
    ConnectFailure {
        index: usize,
        target: String,
        #[source]
        source: Box<ShardError>,
    },

    #[error("Shard key type not supported: {0}")]
    UnsupportedKeyType(String),

    #[error("Shard index {index} is out of range for {num_shards} shard(s)")]
    ShardIndexOutOfRange { index: i64, num_shards: usize },

    #[error("No shards configured")]
    NoShards,

    #[error("Shard {index} is unreachable: {source}")]
    ShardUnreachable {
        index: usize,
        #[source]
        source: Box<ShardError>,
    },

    #[error("Failed to close shard {index}: {source}")]
    ShardCloseFailure {
        index: usize,
        #[source]
        source: Box<ShardError>,
    },

    #[error("Shard manager is closed")]
    ManagerClosed,

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Connection pool timeout after {0:?}: no connections available")]
    PoolTimeout(Duration),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl ShardError {
    /// Index of the shard this error is attributed to, if any.
    pub fn shard_index(&self) -> Option<usize> {
        match self {
            Self::ConnectFailure { index, .. }
            | Self::ShardUnreachable { index, .. }
            | Self::ShardCloseFailure { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub(crate) fn unreachable(index: usize, source: ShardError) -> Self {
        Self::ShardUnreachable {
            index,
            source: Box::new(source),
        }
    }

    pub(crate) fn close_failure(index: usize, source: ShardError) -> Self {
        Self::ShardCloseFailure {
            index,
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, ShardError>;
