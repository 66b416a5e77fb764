use std::time::Duration;

use crate::telemetry;
use crate::telemetry::tags;

/// Telemetry contract for pool workers.
///
/// Workers call these hooks around their lifecycle and every task they run,
/// so a pool can be wired to any metrics backend. All hooks run on the worker
/// thread and must not block.
pub trait WorkerTelemetry: Send + Sync {
    fn on_worker_started(&self, worker_id: usize);
    fn on_worker_stopped(&self, worker_id: usize);
    fn on_queue_depth(&self, worker_id: usize, depth: usize);
    fn on_task_started(&self, worker_id: usize, queue_wait: Duration);
    fn on_task_finished(&self, worker_id: usize, elapsed: Duration);
    fn on_task_failed(&self, worker_id: usize, elapsed: Duration);
}

/// Default telemetry implementation that feeds the in-process metric registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWorkerTelemetry;

impl WorkerTelemetry for DefaultWorkerTelemetry {
    fn on_worker_started(&self, _worker_id: usize) {
        telemetry::increment_counter(tags::METRIC_WORKER_SPAWN_COUNT, 1);
        telemetry::add_gauge(tags::METRIC_WORKER_LIVE_COUNT, 1);
    }

    fn on_worker_stopped(&self, _worker_id: usize) {
        telemetry::increment_counter(tags::METRIC_WORKER_EXIT_COUNT, 1);
        telemetry::sub_gauge_saturating(tags::METRIC_WORKER_LIVE_COUNT, 1);
    }

    fn on_queue_depth(&self, _worker_id: usize, depth: usize) {
        telemetry::increment_counter(tags::METRIC_WORKER_QUEUE_DEPTH_SAMPLES, 1);
        telemetry::set_gauge(tags::METRIC_WORKER_QUEUE_DEPTH, depth as u64);
        telemetry::record_histogram(tags::METRIC_WORKER_QUEUE_DEPTH_HIST, depth as u64);
    }

    fn on_task_started(&self, _worker_id: usize, queue_wait: Duration) {
        let wait_us = queue_wait.as_micros().min(u64::MAX as u128) as u64;

        telemetry::increment_counter(tags::METRIC_WORKER_TASK_START_COUNT, 1);
        telemetry::record_histogram(tags::METRIC_WORKER_QUEUE_WAIT_US, wait_us);
        telemetry::add_gauge(tags::METRIC_WORKER_ACTIVE_COUNT, 1);
    }

    fn on_task_finished(&self, _worker_id: usize, elapsed: Duration) {
        let elapsed_us = elapsed.as_micros().min(u64::MAX as u128) as u64;

        telemetry::increment_counter(tags::METRIC_WORKER_TASK_FINISH_COUNT, 1);
        telemetry::record_histogram(tags::METRIC_WORKER_TASK_LATENCY_US, elapsed_us);
        telemetry::sub_gauge_saturating(tags::METRIC_WORKER_ACTIVE_COUNT, 1);
    }

    fn on_task_failed(&self, _worker_id: usize, elapsed: Duration) {
        let elapsed_us = elapsed.as_micros().min(u64::MAX as u128) as u64;

        telemetry::increment_counter(tags::METRIC_WORKER_TASK_FAIL_COUNT, 1);
        telemetry::record_histogram(tags::METRIC_WORKER_TASK_LATENCY_US, elapsed_us);
        telemetry::sub_gauge_saturating(tags::METRIC_WORKER_ACTIVE_COUNT, 1);
    }
}
