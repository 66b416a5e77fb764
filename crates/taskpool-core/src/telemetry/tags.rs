/// Log target for pool lifecycle events (construct, resize, close).
pub const TARGET_POOL: &str = "taskpool::pool";
/// Log target for worker lifecycle and task execution events.
pub const TARGET_WORKER: &str = "taskpool::worker";
/// Log target for the process-wide default pool.
pub const TARGET_GLOBAL: &str = "taskpool::global";

pub const METRIC_POOL_SUBMIT_COUNT: &str = "taskpool.pool.submit.count";
pub const METRIC_POOL_SUBMIT_REJECTED_COUNT: &str = "taskpool.pool.submit.rejected.count";
pub const METRIC_POOL_RESIZE_COUNT: &str = "taskpool.pool.resize.count";
pub const METRIC_POOL_CLOSE_COUNT: &str = "taskpool.pool.close.count";
pub const METRIC_POOL_SUBMIT_BLOCKED_US: &str = "taskpool.pool.submit.blocked_us";

pub const METRIC_WORKER_SPAWN_COUNT: &str = "taskpool.worker.spawn.count";
pub const METRIC_WORKER_EXIT_COUNT: &str = "taskpool.worker.exit.count";
pub const METRIC_WORKER_TASK_START_COUNT: &str = "taskpool.worker.task.start.count";
pub const METRIC_WORKER_TASK_FINISH_COUNT: &str = "taskpool.worker.task.finish.count";
pub const METRIC_WORKER_TASK_FAIL_COUNT: &str = "taskpool.worker.task.fail.count";
pub const METRIC_WORKER_QUEUE_DEPTH_SAMPLES: &str = "taskpool.worker.queue.depth.samples";

pub const METRIC_WORKER_TASK_LATENCY_US: &str = "taskpool.worker.task.latency_us";
pub const METRIC_WORKER_QUEUE_WAIT_US: &str = "taskpool.worker.queue.wait_us";
pub const METRIC_WORKER_QUEUE_DEPTH_HIST: &str = "taskpool.worker.queue.depth.hist";

pub const METRIC_WORKER_QUEUE_DEPTH: &str = "taskpool.worker.queue.depth";
pub const METRIC_WORKER_ACTIVE_COUNT: &str = "taskpool.worker.active.count";
pub const METRIC_WORKER_LIVE_COUNT: &str = "taskpool.worker.live.count";
