use serde::Serialize;
use std::time::Duration;

/// Outcome of pinging one shard.
#[derive(Debug, Clone, Serialize)]
pub struct ShardHealth {
    pub index: usize,
    /// Redacted connection target
    pub target: String,
    pub latency: Duration,
    pub error: Option<String>,
}

impl ShardHealth {
    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

/// Health of every shard, in shard order.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub shards: Vec<ShardHealth>,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.shards.iter().all(ShardHealth::is_healthy)
    }

    pub fn failing(&self) -> impl Iterator<Item = &ShardHealth> {
        self.shards.iter().filter(|s| !s.is_healthy())
    }

    pub fn failing_indexes(&self) -> Vec<usize> {
        self.failing().map(|s| s.index).collect()
    }
}

impl std::fmt::Display for HealthReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let failing = self.failing_indexes();
        if failing.is_empty() {
            write!(f, "{} shard(s) healthy", self.shards.len())
        } else {
            write!(
                f,
                "{}/{} shard(s) unhealthy: {:?}",
                failing.len(),
                self.shards.len(),
                failing
            )
        }
    }
}
