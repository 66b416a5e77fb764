use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError, bounded};
use tracing::{debug, error, info};

use super::task::{Job, Task};
use super::worker::{Worker, WorkerRuntimeSnapshot, panic_message};
use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::telemetry::{self, WorkerTelemetry, tags};

/// Bounded background-task executor with a resizable set of worker threads.
///
/// Tasks are queued in a FIFO of fixed capacity and drained by the workers on
/// the roster. [`submit`](Pool::submit) blocks while the queue is full, which is
/// the pool's only form of backpressure. The roster can grow or shrink at any
/// time with [`resize`](Pool::resize); [`close`](Pool::close) stops every worker
/// but leaves the queue in place, so a later resize picks up where it left off.
///
/// # Example
/// ```
/// use std::sync::mpsc;
/// use taskpool_core::Pool;
///
/// let pool = Pool::new(2, 4).unwrap();
/// let (tx, rx) = mpsc::channel();
/// for i in 0..4 {
///     let tx = tx.clone();
///     pool.submit(move || tx.send(i * 2).unwrap()).unwrap();
/// }
/// let mut results: Vec<i32> = rx.iter().take(4).collect();
/// results.sort();
/// assert_eq!(results, vec![0, 2, 4, 6]);
/// ```
pub struct Pool {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
    queue_capacity: usize,
    roster: Mutex<Roster>,
    next_task_id: AtomicU64,
    state: Arc<PoolState>,
}

/// State shared between the pool and its worker threads.
pub(crate) struct PoolState {
    pub(crate) thread_name_prefix: String,
    pub(crate) stack_size: Option<usize>,
    pub(crate) telemetry: Arc<dyn WorkerTelemetry>,
    pub(crate) started_at: Instant,
    pub(crate) live_workers: AtomicUsize,
    pub(crate) submitted: AtomicUsize,
    pub(crate) completed: AtomicUsize,
    pub(crate) failed: AtomicUsize,
}

#[derive(Default)]
struct Roster {
    workers: Vec<Worker>,
    /// Threads of stopped workers that may still be finishing a task.
    retired: Vec<JoinHandle<()>>,
    next_worker_id: usize,
}

impl Roster {
    fn retire(&mut self, workers: Vec<Worker>) {
        self.retired.retain(|handle| !handle.is_finished());
        for worker in workers {
            debug!(target: tags::TARGET_POOL, worker_id = worker.id(), "stopping worker");
            self.retired.push(worker.retire());
        }
    }
}

/// Runtime metrics snapshot for a pool.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolRuntimeSnapshot {
    /// Time since the pool was constructed.
    pub elapsed: Duration,
    /// Tasks accepted into the queue.
    pub submitted: usize,
    /// Tasks that ran to completion.
    pub completed: usize,
    /// Tasks that panicked.
    pub failed: usize,
    /// Submitted tasks that have not finished yet, queued or running.
    pub pending: usize,
    /// Tasks waiting in the queue.
    pub queued: usize,
    /// Fixed queue capacity.
    pub queue_capacity: usize,
    /// Worker threads still running, including stopped ones finishing a task.
    pub live_workers: usize,
    /// One entry per worker on the roster, in roster order.
    pub workers: Vec<WorkerRuntimeSnapshot>,
}

impl Pool {
    /// Creates a pool with `workers` threads and room for `queue_size` queued tasks.
    pub fn new(workers: usize, queue_size: usize) -> Result<Self> {
        Self::with_config(PoolConfig::new(workers, queue_size))
    }

    pub fn with_config(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let (sender, receiver) = bounded(config.queue_size);
        let pool = Self {
            sender,
            receiver,
            queue_capacity: config.queue_size,
            roster: Mutex::new(Roster::default()),
            next_task_id: AtomicU64::new(0),
            state: Arc::new(PoolState {
                thread_name_prefix: config.thread_name_prefix,
                stack_size: config.stack_size,
                telemetry: config.telemetry,
                started_at: Instant::now(),
                live_workers: AtomicUsize::new(0),
                submitted: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
            }),
        };

        {
            let mut roster = pool.lock_roster();
            let workers = pool.spawn_workers(&mut roster, config.workers)?;
            roster.workers = workers;
        }

        info!(
            target: tags::TARGET_POOL,
            workers = config.workers,
            queue_size = config.queue_size,
            "pool started"
        );
        Ok(pool)
    }

    /// Queues a task, blocking while the queue is full.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let task = self.make_task(Box::new(job));
        let started_at = Instant::now();
        self.state.submitted.fetch_add(1, Ordering::AcqRel);

        if self.sender.send(task).is_err() {
            return Err(self.reject(PoolError::QueueDisconnected));
        }

        telemetry::increment_counter(tags::METRIC_POOL_SUBMIT_COUNT, 1);
        telemetry::record_histogram(
            tags::METRIC_POOL_SUBMIT_BLOCKED_US,
            telemetry::elapsed_us(started_at),
        );
        Ok(())
    }

    /// Queues a task only if a slot is free right now.
    pub fn try_submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let task = self.make_task(Box::new(job));
        self.state.submitted.fetch_add(1, Ordering::AcqRel);

        match self.sender.try_send(task) {
            Ok(()) => {
                telemetry::increment_counter(tags::METRIC_POOL_SUBMIT_COUNT, 1);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(self.reject(PoolError::QueueFull)),
            Err(TrySendError::Disconnected(_)) => Err(self.reject(PoolError::QueueDisconnected)),
        }
    }

    /// Queues a task, waiting at most `timeout` for a free slot.
    pub fn submit_timeout<F>(&self, job: F, timeout: Duration) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let task = self.make_task(Box::new(job));
        let started_at = Instant::now();
        self.state.submitted.fetch_add(1, Ordering::AcqRel);

        match self.sender.send_timeout(task, timeout) {
            Ok(()) => {
                telemetry::increment_counter(tags::METRIC_POOL_SUBMIT_COUNT, 1);
                telemetry::record_histogram(
                    tags::METRIC_POOL_SUBMIT_BLOCKED_US,
                    telemetry::elapsed_us(started_at),
                );
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => Err(self.reject(PoolError::QueueFull)),
            Err(SendTimeoutError::Disconnected(_)) => {
                Err(self.reject(PoolError::QueueDisconnected))
            }
        }
    }

    /// Changes the number of workers.
    ///
    /// Growing appends new workers; shrinking stops the workers at the end of the
    /// roster, each after its current task. Queue capacity is never changed. On a
    /// closed pool this starts a fresh roster that resumes draining the queue.
    pub fn resize(&self, workers: usize) -> Result<()> {
        if workers < 1 {
            return Err(PoolError::InvalidConfiguration {
                workers,
                queue_size: self.queue_capacity,
            });
        }

        let mut roster = self.lock_roster();
        let current = roster.workers.len();
        if workers == current {
            return Ok(());
        }

        if workers < current {
            let excess = roster.workers.split_off(workers);
            roster.retire(excess);
        } else {
            let grown = self.spawn_workers(&mut roster, workers - current)?;
            roster.workers.extend(grown);
        }

        telemetry::increment_counter(tags::METRIC_POOL_RESIZE_COUNT, 1);
        info!(target: tags::TARGET_POOL, from = current, to = workers, "pool resized");
        Ok(())
    }

    /// Stops every worker and empties the roster.
    ///
    /// Running tasks finish; tasks still queued are left untouched and run only if
    /// the pool is resized again.
    pub fn close(&self) {
        let mut roster = self.lock_roster();
        let workers = std::mem::take(&mut roster.workers);
        let stopped = workers.len();
        roster.retire(workers);

        telemetry::increment_counter(tags::METRIC_POOL_CLOSE_COUNT, 1);
        info!(
            target: tags::TARGET_POOL,
            stopped,
            abandoned = self.sender.len(),
            "pool closed"
        );
    }

    /// Closes the pool and waits for every worker thread it ever started to exit.
    ///
    /// Blocks until in-flight tasks complete.
    pub fn shutdown(self) -> Result<()> {
        self.close();
        let retired = std::mem::take(&mut self.lock_roster().retired);

        let mut first_error = None;
        for handle in retired {
            if let Err(payload) = handle.join() {
                let details = panic_message(payload.as_ref());
                first_error.get_or_insert_with(|| {
                    PoolError::Other(anyhow::anyhow!("worker thread panicked: {details}"))
                });
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Number of workers on the roster.
    pub fn worker_count(&self) -> usize {
        self.lock_roster().workers.len()
    }

    /// Number of worker threads whose loop is still running, including stopped
    /// workers still finishing their last task.
    pub fn live_workers(&self) -> usize {
        self.state.live_workers.load(Ordering::Acquire)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.sender.len()
    }

    pub fn runtime_snapshot(&self) -> PoolRuntimeSnapshot {
        let workers = self
            .lock_roster()
            .workers
            .iter()
            .map(Worker::snapshot)
            .collect();
        let submitted = self.state.submitted.load(Ordering::Acquire);
        let completed = self.state.completed.load(Ordering::Acquire);
        let failed = self.state.failed.load(Ordering::Acquire);

        PoolRuntimeSnapshot {
            elapsed: self.state.started_at.elapsed(),
            submitted,
            completed,
            failed,
            pending: submitted.saturating_sub(completed + failed),
            queued: self.queued(),
            queue_capacity: self.queue_capacity,
            live_workers: self.live_workers(),
            workers,
        }
    }

    fn make_task(&self, job: Job) -> Task {
        Task::new(self.next_task_id.fetch_add(1, Ordering::Relaxed), job)
    }

    fn reject(&self, error: PoolError) -> PoolError {
        self.state.submitted.fetch_sub(1, Ordering::AcqRel);
        telemetry::increment_counter(tags::METRIC_POOL_SUBMIT_REJECTED_COUNT, 1);
        error
    }

    /// Spawns `count` workers. Either all of them start or none stay running.
    fn spawn_workers(&self, roster: &mut Roster, count: usize) -> Result<Vec<Worker>> {
        let mut spawned = Vec::with_capacity(count);
        for _ in 0..count {
            let id = roster.next_worker_id;
            match Worker::spawn(id, self.receiver.clone(), Arc::clone(&self.state)) {
                Ok(worker) => {
                    roster.next_worker_id += 1;
                    spawned.push(worker);
                }
                Err(err) => {
                    error!(
                        target: tags::TARGET_POOL,
                        worker_id = id,
                        error = %err,
                        "failed to spawn worker"
                    );
                    roster.retire(spawned);
                    return Err(err);
                }
            }
        }
        debug!(target: tags::TARGET_POOL, count, "workers spawned");
        Ok(spawned)
    }

    fn lock_roster(&self) -> MutexGuard<'_, Roster> {
        match self.roster.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if !self.lock_roster().workers.is_empty() {
            self.close();
        }
    }
}
