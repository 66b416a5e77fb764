use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, select};
use tracing::{debug, warn};

use super::pool::PoolState;
use super::task::Task;
use crate::error::{PoolError, Result};
use crate::telemetry::{self, tags};

/// Per-worker runtime metrics captured by the pool.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerRuntimeSnapshot {
    /// Pool-unique worker id, also used in the thread name.
    pub worker_id: usize,
    /// Tasks this worker ran to completion.
    pub tasks_completed: usize,
    /// Tasks this worker ran that panicked.
    pub tasks_failed: usize,
    /// Time since the worker was spawned.
    pub uptime: Duration,
    /// Time spent executing tasks.
    pub busy: Duration,
    /// Time spent waiting for work.
    pub idle: Duration,
    /// Share of uptime spent busy, in `0.0..=1.0`.
    pub utilization: f64,
}

#[derive(Debug)]
struct WorkerStats {
    started_at: Instant,
    completed: AtomicUsize,
    failed: AtomicUsize,
    busy_us: AtomicU64,
}

impl WorkerStats {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            busy_us: AtomicU64::new(0),
        }
    }
}

/// Handle to one worker thread in a pool roster.
///
/// Dropping the handle without calling [`Worker::stop`] still stops the worker:
/// the loop treats a disconnected stop channel as a stop signal.
pub(crate) struct Worker {
    id: usize,
    stop_tx: Sender<()>,
    stats: Arc<WorkerStats>,
    thread: JoinHandle<()>,
}

impl Worker {
    /// Spawns a worker thread bound to `queue`.
    ///
    /// The worker counts as live from the moment this returns `Ok`.
    pub(crate) fn spawn(id: usize, queue: Receiver<Task>, state: Arc<PoolState>) -> Result<Self> {
        // One slot is all a worker ever needs, so stopping never blocks.
        let (stop_tx, stop_rx) = bounded(1);
        let stats = Arc::new(WorkerStats::new());

        let mut builder = thread::Builder::new().name(format!("{}-w{id}", state.thread_name_prefix));
        if let Some(stack_size) = state.stack_size {
            builder = builder.stack_size(stack_size);
        }

        state.live_workers.fetch_add(1, Ordering::AcqRel);
        let worker_state = Arc::clone(&state);
        let worker_stats = Arc::clone(&stats);
        let spawned = builder.spawn(move || {
            run_worker_loop(id, queue, stop_rx, worker_state, worker_stats);
        });

        match spawned {
            Ok(thread) => Ok(Self {
                id,
                stop_tx,
                stats,
                thread,
            }),
            Err(err) => {
                state.live_workers.fetch_sub(1, Ordering::AcqRel);
                Err(PoolError::Spawn(err))
            }
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Signals the worker to exit once its current task, if any, completes.
    ///
    /// Never blocks; a stop already pending is left as is.
    pub(crate) fn stop(&self) {
        // Full means a stop is already pending; Disconnected means the thread is gone.
        let _ = self.stop_tx.try_send(());
    }

    /// Stops the worker and hands back its thread so the caller may join it later.
    pub(crate) fn retire(self) -> JoinHandle<()> {
        self.stop();
        self.thread
    }

    pub(crate) fn snapshot(&self) -> WorkerRuntimeSnapshot {
        let uptime = self.stats.started_at.elapsed();
        let uptime_us = uptime.as_micros().min(u64::MAX as u128) as u64;
        let busy_us = self.stats.busy_us.load(Ordering::Acquire).min(uptime_us);
        let idle_us = uptime_us.saturating_sub(busy_us);
        let utilization = if uptime_us == 0 {
            0.0
        } else {
            busy_us as f64 / uptime_us as f64
        };

        WorkerRuntimeSnapshot {
            worker_id: self.id,
            tasks_completed: self.stats.completed.load(Ordering::Acquire),
            tasks_failed: self.stats.failed.load(Ordering::Acquire),
            uptime,
            busy: Duration::from_micros(busy_us),
            idle: Duration::from_micros(idle_us),
            utilization,
        }
    }
}

/// Keeps the pool's live count honest however the loop exits.
struct LiveGuard<'a> {
    id: usize,
    state: &'a PoolState,
}

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.state.live_workers.fetch_sub(1, Ordering::AcqRel);
        self.state.telemetry.on_worker_stopped(self.id);
        debug!(target: tags::TARGET_WORKER, worker_id = self.id, "worker stopped");
    }
}

fn run_worker_loop(
    id: usize,
    queue: Receiver<Task>,
    stop: Receiver<()>,
    state: Arc<PoolState>,
    stats: Arc<WorkerStats>,
) {
    let _live = LiveGuard {
        id,
        state: state.as_ref(),
    };
    state.telemetry.on_worker_started(id);
    debug!(target: tags::TARGET_WORKER, worker_id = id, "worker started");

    loop {
        // A pending stop wins over queued work.
        match stop.try_recv() {
            Err(TryRecvError::Empty) => {}
            Ok(()) | Err(TryRecvError::Disconnected) => break,
        }

        let received = select! {
            recv(stop) -> _ => None,
            recv(queue) -> received => Some(received),
        };
        let task = match received {
            Some(Ok(task)) => task,
            Some(Err(_)) => {
                debug!(target: tags::TARGET_WORKER, worker_id = id, "task queue disconnected");
                break;
            }
            None => break,
        };

        state.telemetry.on_queue_depth(id, queue.len());
        execute(id, task, &state, &stats);
    }
}

fn execute(id: usize, task: Task, state: &PoolState, stats: &WorkerStats) {
    let task_id = task.id();
    state.telemetry.on_task_started(id, task.queue_wait());
    let started_at = Instant::now();

    let outcome = catch_unwind(AssertUnwindSafe(|| task.run()));

    let elapsed_us = telemetry::elapsed_us(started_at);
    let elapsed = Duration::from_micros(elapsed_us);
    stats.busy_us.fetch_add(elapsed_us, Ordering::AcqRel);

    match outcome {
        Ok(()) => {
            stats.completed.fetch_add(1, Ordering::AcqRel);
            state.completed.fetch_add(1, Ordering::AcqRel);
            state.telemetry.on_task_finished(id, elapsed);
        }
        Err(payload) => {
            stats.failed.fetch_add(1, Ordering::AcqRel);
            state.failed.fetch_add(1, Ordering::AcqRel);
            state.telemetry.on_task_failed(id, elapsed);
            warn!(
                target: tags::TARGET_WORKER,
                worker_id = id,
                task_id,
                panic = %panic_message(payload.as_ref()),
                "task panicked; worker continues"
            );
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
