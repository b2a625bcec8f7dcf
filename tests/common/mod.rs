#![allow(dead_code)]

use async_trait::async_trait;
use pgshard::{PoolConnector, Result, ShardError, ShardPool};
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Observable state of one mock shard.
#[derive(Debug)]
pub struct MockState {
    pub target: String,
    healthy: AtomicBool,
    fail_close: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    ping_calls: AtomicUsize,
}

impl MockState {
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn fail_close(&self) {
        self.fail_close.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn ping_calls(&self) -> usize {
        self.ping_calls.load(Ordering::SeqCst)
    }
}

/// In-memory stand-in for a database pool.
#[derive(Debug)]
pub struct MockPool {
    pub state: Arc<MockState>,
}

impl MockPool {
    pub fn target(&self) -> &str {
        &self.state.target
    }
}

#[async_trait]
impl ShardPool for MockPool {
    async fn ping(&self) -> Result<()> {
        self.state.ping_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.is_closed() {
            return Err(ShardError::PoolClosed);
        }
        if !self.state.healthy.load(Ordering::SeqCst) {
            return Err(ShardError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} refused connection", self.state.target),
            )));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(ShardError::Io(io::Error::other("close failed")));
        }
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        self.state.target.clone()
    }
}

/// Opens [`MockPool`]s, refusing targets marked unreachable, and remembers every pool it
/// opened.
#[derive(Default)]
pub struct MockConnector {
    unreachable: HashSet<String>,
    opened: Mutex<Vec<Arc<MockState>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable(mut self, target: &str) -> Self {
        self.unreachable.insert(target.to_string());
        self
    }

    pub fn opened(&self) -> Vec<Arc<MockState>> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl PoolConnector for MockConnector {
    type Pool = MockPool;

    async fn connect(&self, target: &str) -> Result<MockPool> {
        if self.unreachable.contains(target) {
            return Err(ShardError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("cannot reach {}", target),
            )));
        }

        let state = Arc::new(MockState {
            target: target.to_string(),
            healthy: AtomicBool::new(true),
            fail_close: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            ping_calls: AtomicUsize::new(0),
        });
        self.opened.lock().unwrap().push(Arc::clone(&state));
        Ok(MockPool { state })
    }
}

pub fn targets(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}
