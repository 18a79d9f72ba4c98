use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::{MiniqError, Result};

pub const DEFAULT_PORT: u16 = 9876;

/// Limits for the queue engine. Fixed for the lifetime of an engine.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of live jobs (queued, running or killing) accepted.
    pub max_queued: usize,
    /// Maximum number of jobs whose processes run at the same time.
    pub max_running: usize,
    /// Delay between SIGTERM and SIGKILL when a running job is deleted.
    pub kill_grace_period: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queued: 100,
            max_running: 4,
            kill_grace_period: Duration::from_secs(10),
        }
    }
}

impl QueueConfig {
    pub fn new(max_queued: usize, max_running: usize) -> Self {
        Self {
            max_queued,
            max_running,
            ..Default::default()
        }
    }

    pub fn with_kill_grace_period(mut self, grace: Duration) -> Self {
        self.kill_grace_period = grace;
        self
    }

    /// Reject limits the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_queued == 0 {
            return Err(MiniqError::InvalidConfig(
                "max_queued must be at least 1".to_string(),
            ));
        }
        if self.max_running == 0 {
            return Err(MiniqError::InvalidConfig(
                "max_running must be at least 1".to_string(),
            ));
        }
        if self.max_running > Semaphore::MAX_PERMITS {
            return Err(MiniqError::InvalidConfig(format!(
                "max_running must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub queue: QueueConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            queue: QueueConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr, queue: QueueConfig) -> Self {
        Self { listen_addr, queue }
    }
}
