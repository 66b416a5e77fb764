use std::fmt;
use std::sync::Arc;

use crate::error::{PoolError, Result};
use crate::telemetry::tags;
use crate::telemetry::{DefaultWorkerTelemetry, WorkerTelemetry};

/// Environment variable overriding the default worker count.
pub const WORKERS_ENV: &str = "TASKPOOL_WORKERS";
/// Environment variable overriding the default queue capacity.
pub const QUEUE_SIZE_ENV: &str = "TASKPOOL_QUEUE_SIZE";

const DEFAULT_THREAD_NAME_PREFIX: &str = "taskpool";

/// Construction parameters for a [`Pool`](crate::Pool).
///
/// # Example
/// ```
/// use taskpool_core::{Pool, PoolConfig};
///
/// let config = PoolConfig::new(2, 8).thread_name_prefix("ingest");
/// let pool = Pool::with_config(config).unwrap();
/// assert_eq!(pool.worker_count(), 2);
/// assert_eq!(pool.queue_capacity(), 8);
/// ```
#[derive(Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_size: usize,
    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
    pub telemetry: Arc<dyn WorkerTelemetry>,
}

impl PoolConfig {
    pub fn new(workers: usize, queue_size: usize) -> Self {
        Self {
            workers,
            queue_size,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            stack_size: None,
            telemetry: Arc::new(DefaultWorkerTelemetry),
        }
    }

    /// Host-sized defaults overridden by `TASKPOOL_WORKERS` / `TASKPOOL_QUEUE_SIZE`.
    ///
    /// An override that is not a positive integer is logged and ignored, so the
    /// result always passes [`validate`](Self::validate).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(workers) = read_env_count(WORKERS_ENV) {
            config.workers = workers;
        }
        if let Some(queue_size) = read_env_count(QUEUE_SIZE_ENV) {
            config.queue_size = queue_size;
        }
        config
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Worker threads are named `<prefix>-w<id>`.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn WorkerTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers < 1 || self.queue_size < 1 {
            return Err(PoolError::InvalidConfiguration {
                workers: self.workers,
                queue_size: self.queue_size,
            });
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        Self::new(cpus, cpus * 2)
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("workers", &self.workers)
            .field("queue_size", &self.queue_size)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("stack_size", &self.stack_size)
            .finish_non_exhaustive()
    }
}

/// Reads a count override. Values that do not parse, or are zero, are ignored.
fn read_env_count(key: &str) -> Option<usize> {
    let raw = std::env::var(key).ok()?;
    let reason = match raw.trim().parse::<usize>() {
        Ok(0) => "must be at least 1".to_string(),
        Ok(value) => return Some(value),
        Err(err) => err.to_string(),
    };
    tracing::warn!(
        target: tags::TARGET_GLOBAL,
        key,
        value = %raw,
        reason = %reason,
        "ignoring invalid pool size override"
    );
    None
}
