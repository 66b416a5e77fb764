use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use taskpool_core::{Pool, PoolConfig, PoolError};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Occupies one worker until the returned sender is used or dropped.
fn block_worker(pool: &Pool) -> Result<mpsc::Sender<()>, Box<dyn std::error::Error>> {
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel();
    pool.submit(move || {
        started_tx.send(()).expect("test receiver alive");
        let _ = release_rx.recv();
    })?;
    started_rx.recv_timeout(Duration::from_secs(5))?;
    Ok(release_tx)
}

#[test]
fn rejects_zero_workers_or_queue_size() {
    for (workers, queue_size) in [(0, 1), (1, 0), (0, 0)] {
        match Pool::new(workers, queue_size) {
            Err(PoolError::InvalidConfiguration {
                workers: w,
                queue_size: q,
            }) => {
                assert_eq!((w, q), (workers, queue_size));
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("pool created with workers={workers} queue_size={queue_size}"),
        }
    }
}

#[test]
fn construct_starts_requested_workers_with_empty_queue() -> TestResult {
    let pool = Pool::new(3, 5)?;

    assert_eq!(pool.worker_count(), 3);
    assert_eq!(pool.live_workers(), 3);
    assert_eq!(pool.queue_capacity(), 5);
    assert_eq!(pool.queued(), 0);

    let snapshot = pool.runtime_snapshot();
    assert_eq!(snapshot.workers.len(), 3);
    assert_eq!(snapshot.submitted, 0);
    assert_eq!(snapshot.pending, 0);

    Ok(())
}

#[test]
fn executes_every_submitted_task() -> TestResult {
    let pool = Pool::new(4, 8)?;
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..100 {
        let counter = Arc::clone(&counter);
        pool.submit(move || {
            counter.fetch_add(1, Ordering::AcqRel);
        })?;
    }

    assert!(wait_until(Duration::from_secs(5), || {
        counter.load(Ordering::Acquire) == 100
    }));
    assert!(wait_until(Duration::from_secs(1), || {
        pool.runtime_snapshot().completed == 100
    }));

    Ok(())
}

#[test]
fn single_worker_preserves_submission_order() -> TestResult {
    let pool = Pool::new(1, 4)?;
    let seen = Arc::new(Mutex::new(Vec::new()));

    for id in 0..32usize {
        let seen = Arc::clone(&seen);
        pool.submit(move || seen.lock().expect("seen mutex poisoned").push(id))?;
    }

    assert!(wait_until(Duration::from_secs(5), || {
        seen.lock().expect("seen mutex poisoned").len() == 32
    }));
    let seen = seen.lock().expect("seen mutex poisoned");
    assert_eq!(*seen, (0..32).collect::<Vec<_>>());

    Ok(())
}

#[test]
fn submit_blocks_while_queue_is_full() -> TestResult {
    let pool = Arc::new(Pool::new(1, 2)?);
    let release = block_worker(&pool)?;
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let counter = Arc::clone(&counter);
        pool.submit(move || {
            counter.fetch_add(1, Ordering::AcqRel);
        })?;
    }
    assert_eq!(pool.queued(), 2);

    let (done_tx, done_rx) = mpsc::channel();
    let producer = {
        let pool = Arc::clone(&pool);
        let counter = Arc::clone(&counter);
        thread::spawn(move || {
            let result = pool.submit(move || {
                counter.fetch_add(1, Ordering::AcqRel);
            });
            done_tx.send(result.is_ok()).expect("test receiver alive");
        })
    };

    assert!(
        done_rx.recv_timeout(Duration::from_millis(200)).is_err(),
        "submit returned while the queue was full"
    );

    release.send(())?;
    assert!(done_rx.recv_timeout(Duration::from_secs(5))?);
    producer.join().expect("producer thread panicked");

    assert!(wait_until(Duration::from_secs(5), || {
        counter.load(Ordering::Acquire) == 3
    }));

    Ok(())
}

#[test]
fn try_submit_and_submit_timeout_report_full_queue() -> TestResult {
    let pool = Pool::new(1, 1)?;
    let release = block_worker(&pool)?;
    pool.submit(|| {})?;

    assert!(matches!(pool.try_submit(|| {}), Err(PoolError::QueueFull)));

    let started_at = Instant::now();
    let result = pool.submit_timeout(|| {}, Duration::from_millis(50));
    assert!(matches!(result, Err(PoolError::QueueFull)));
    assert!(started_at.elapsed() >= Duration::from_millis(50));

    // Rejected submissions are not counted as pending work.
    assert_eq!(pool.runtime_snapshot().submitted, 2);

    release.send(())?;
    assert!(wait_until(Duration::from_secs(5), || pool.queued() == 0));
    pool.try_submit(|| {})?;

    Ok(())
}

#[test]
fn resize_rejects_zero_and_ignores_same_size() -> TestResult {
    let pool = Pool::new(2, 4)?;

    let err = pool.resize(0).expect_err("resize to zero must fail");
    assert!(err.is_invalid_configuration());
    assert_eq!(pool.worker_count(), 2);

    pool.resize(2)?;
    assert_eq!(pool.worker_count(), 2);
    assert_eq!(pool.live_workers(), 2);

    Ok(())
}

#[test]
fn shrinking_runs_every_task_exactly_once() -> TestResult {
    let pool = Pool::new(4, 16)?;
    let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..100).map(|_| AtomicUsize::new(0)).collect());

    for id in 0..50usize {
        let runs = Arc::clone(&runs);
        pool.submit(move || {
            thread::sleep(Duration::from_millis(2));
            runs[id].fetch_add(1, Ordering::AcqRel);
        })?;
    }

    pool.resize(1)?;
    assert_eq!(pool.worker_count(), 1);
    assert_eq!(pool.queue_capacity(), 16);

    for id in 50..100usize {
        let runs = Arc::clone(&runs);
        pool.submit(move || {
            runs[id].fetch_add(1, Ordering::AcqRel);
        })?;
    }

    assert!(wait_until(Duration::from_secs(10), || {
        runs.iter().all(|count| count.load(Ordering::Acquire) >= 1)
    }));
    assert!(runs.iter().all(|count| count.load(Ordering::Acquire) == 1));
    assert!(wait_until(Duration::from_secs(5), || pool.live_workers() == 1));

    Ok(())
}

#[test]
fn stopped_worker_finishes_its_current_task() -> TestResult {
    let pool = Pool::new(2, 4)?;
    let finished = Arc::new(AtomicUsize::new(0));
    let (started_tx, started_rx) = mpsc::channel();

    for _ in 0..2 {
        let finished = Arc::clone(&finished);
        let started_tx = started_tx.clone();
        pool.submit(move || {
            started_tx.send(()).expect("test receiver alive");
            thread::sleep(Duration::from_millis(150));
            finished.fetch_add(1, Ordering::AcqRel);
        })?;
    }
    started_rx.recv_timeout(Duration::from_secs(5))?;
    started_rx.recv_timeout(Duration::from_secs(5))?;

    pool.resize(1)?;
    assert_eq!(pool.live_workers(), 2, "stop must not preempt a running task");

    assert!(wait_until(Duration::from_secs(5), || {
        finished.load(Ordering::Acquire) == 2
    }));
    assert!(wait_until(Duration::from_secs(5), || pool.live_workers() == 1));

    Ok(())
}

fn time_batch(
    pool: &Pool,
    tasks: usize,
    task_ms: u64,
) -> Result<Duration, Box<dyn std::error::Error>> {
    let (done_tx, done_rx) = mpsc::channel();
    let started_at = Instant::now();
    for _ in 0..tasks {
        let done_tx = done_tx.clone();
        pool.submit(move || {
            thread::sleep(Duration::from_millis(task_ms));
            done_tx.send(()).expect("test receiver alive");
        })?;
    }
    for _ in 0..tasks {
        done_rx.recv_timeout(Duration::from_secs(10))?;
    }
    Ok(started_at.elapsed())
}

#[test]
fn growing_increases_throughput() -> TestResult {
    let pool = Pool::new(1, 32)?;
    let single = time_batch(&pool, 16, 25)?;

    pool.resize(4)?;
    assert_eq!(pool.worker_count(), 4);
    assert_eq!(pool.live_workers(), 4);
    let grown = time_batch(&pool, 16, 25)?;

    assert!(
        grown < single,
        "expected more workers to finish faster: single={single:?} grown={grown:?}"
    );

    Ok(())
}

#[test]
fn two_workers_halve_wall_time() -> TestResult {
    let pool = Pool::new(2, 4)?;
    let elapsed = time_batch(&pool, 20, 100)?;

    assert!(
        elapsed >= Duration::from_millis(950),
        "finished too fast: {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_millis(1800),
        "finished too slow: {elapsed:?}"
    );

    Ok(())
}

#[test]
fn close_abandons_queued_tasks_until_resized() -> TestResult {
    let pool = Pool::new(1, 8)?;
    let release = block_worker(&pool)?;
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let counter = Arc::clone(&counter);
        pool.submit(move || {
            counter.fetch_add(1, Ordering::AcqRel);
        })?;
    }

    pool.close();
    assert_eq!(pool.worker_count(), 0);

    release.send(())?;
    assert!(wait_until(Duration::from_secs(5), || pool.live_workers() == 0));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(counter.load(Ordering::Acquire), 0);
    assert_eq!(pool.queued(), 5);

    // Closing twice is harmless.
    pool.close();

    pool.resize(2)?;
    assert_eq!(pool.worker_count(), 2);
    assert!(wait_until(Duration::from_secs(5), || {
        counter.load(Ordering::Acquire) == 5
    }));
    assert_eq!(pool.queued(), 0);

    Ok(())
}

#[test]
fn submit_still_queues_after_close() -> TestResult {
    let pool = Pool::new(2, 4)?;
    pool.close();
    assert!(wait_until(Duration::from_secs(5), || pool.live_workers() == 0));

    let (done_tx, done_rx) = mpsc::channel();
    pool.submit(move || done_tx.send(()).expect("test receiver alive"))?;
    assert_eq!(pool.queued(), 1);
    assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

    pool.resize(1)?;
    done_rx.recv_timeout(Duration::from_secs(5))?;

    Ok(())
}

#[test]
fn task_observes_external_cancellation() -> TestResult {
    let pool = Pool::new(1, 1)?;
    let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
    let (outcome_tx, outcome_rx) = mpsc::channel();

    pool.submit(move || {
        let outcome = match cancel_rx.recv_timeout(Duration::from_secs(2)) {
            Ok(()) => "cancelled",
            Err(_) => "timed out",
        };
        outcome_tx.send(outcome).expect("test receiver alive");
    })?;

    let started_at = Instant::now();
    thread::sleep(Duration::from_secs(1));
    cancel_tx.send(())?;

    let outcome = outcome_rx.recv_timeout(Duration::from_secs(5))?;
    assert_eq!(outcome, "cancelled");
    assert!(started_at.elapsed() < Duration::from_secs(2));

    Ok(())
}

#[test]
fn task_observes_deadline() -> TestResult {
    let pool = Pool::new(1, 1)?;
    let (_cancel_tx, cancel_rx) = mpsc::channel::<()>();
    let (outcome_tx, outcome_rx) = mpsc::channel();
    let deadline = Instant::now() + Duration::from_millis(500);

    pool.submit(move || {
        let wait = deadline.saturating_duration_since(Instant::now());
        let finished_in_time = cancel_rx.recv_timeout(wait).is_ok();
        outcome_tx.send(finished_in_time).expect("test receiver alive");
    })?;

    assert!(!outcome_rx.recv_timeout(Duration::from_secs(5))?);

    Ok(())
}

#[test]
fn panicking_task_does_not_kill_its_worker() -> TestResult {
    let pool = Pool::new(1, 4)?;
    let (done_tx, done_rx) = mpsc::channel();

    pool.submit(|| panic!("task failure"))?;
    pool.submit(move || done_tx.send(42).expect("test receiver alive"))?;

    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5))?, 42);
    assert_eq!(pool.live_workers(), 1);

    let snapshot = pool.runtime_snapshot();
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.workers[0].tasks_failed, 1);
    assert!(wait_until(Duration::from_secs(1), || {
        pool.runtime_snapshot().completed == 1
    }));

    Ok(())
}

#[test]
fn shutdown_waits_for_in_flight_tasks() -> TestResult {
    let pool = Pool::new(2, 8)?;
    let finished = Arc::new(AtomicUsize::new(0));
    let (started_tx, started_rx) = mpsc::channel();

    for _ in 0..2 {
        let finished = Arc::clone(&finished);
        let started_tx = started_tx.clone();
        pool.submit(move || {
            started_tx.send(()).expect("test receiver alive");
            thread::sleep(Duration::from_millis(100));
            finished.fetch_add(1, Ordering::AcqRel);
        })?;
    }
    started_rx.recv_timeout(Duration::from_secs(5))?;
    started_rx.recv_timeout(Duration::from_secs(5))?;

    pool.resize(1)?;
    pool.shutdown()?;

    assert_eq!(finished.load(Ordering::Acquire), 2);

    Ok(())
}

#[test]
fn workers_use_configured_thread_names() -> TestResult {
    let pool = Pool::with_config(PoolConfig::new(1, 1).thread_name_prefix("ingest"))?;
    let (name_tx, name_rx) = mpsc::channel();

    pool.submit(move || {
        let name = thread::current().name().map(str::to_owned);
        name_tx.send(name).expect("test receiver alive");
    })?;

    let name = name_rx.recv_timeout(Duration::from_secs(5))?;
    assert_eq!(name.as_deref(), Some("ingest-w0"));

    Ok(())
}

#[test]
fn concurrent_producers_and_resizes_lose_nothing() -> TestResult {
    let pool = Arc::new(Pool::new(2, 4)?);
    let counter = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for _ in 0..50 {
                    let counter = Arc::clone(&counter);
                    pool.submit(move || {
                        counter.fetch_add(1, Ordering::AcqRel);
                    })
                    .expect("submit on a live pool");
                }
            })
        })
        .collect();

    for size in [5, 1, 3, 2, 6, 1, 4] {
        pool.resize(size)?;
        thread::sleep(Duration::from_millis(2));
    }

    for producer in producers {
        producer.join().expect("producer thread panicked");
    }

    assert!(wait_until(Duration::from_secs(10), || {
        counter.load(Ordering::Acquire) == 200
    }));
    assert_eq!(pool.worker_count(), 4);
    assert!(wait_until(Duration::from_secs(5), || pool.live_workers() == 4));

    Ok(())
}
