use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use taskpool_core::{Pool, PoolConfig, PoolRuntimeSnapshot};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "taskpool",
    version,
    about = "Drive a bounded task pool with a synthetic workload",
    long_about = "Submit sleeping tasks to a bounded worker pool, optionally resizing or closing it mid-run, and report throughput."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic sleep workload through the pool.
    Run {
        /// Number of worker threads (defaults to CPU count).
        #[arg(long, default_value_t = num_cpus::get())]
        workers: usize,

        /// Queue capacity (defaults to twice the CPU count).
        #[arg(long, default_value_t = num_cpus::get() * 2)]
        queue_size: usize,

        /// Number of tasks to submit.
        #[arg(long, default_value_t = 100)]
        tasks: usize,

        /// How long each task sleeps, in milliseconds.
        #[arg(long, default_value_t = 50)]
        task_ms: u64,

        /// Resize the pool to this many workers once half the tasks are submitted.
        #[arg(long)]
        resize_to: Option<usize>,

        /// Close the pool once this many tasks have finished, abandoning whatever is still queued.
        #[arg(long)]
        close_after: Option<usize>,

        /// Progress refresh interval in milliseconds.
        #[arg(long, default_value_t = 250)]
        stats_interval_ms: u64,

        /// Print the final runtime snapshot as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

struct RunOptions {
    workers: usize,
    queue_size: usize,
    tasks: usize,
    task_ms: u64,
    resize_to: Option<usize>,
    close_after: Option<usize>,
    stats_interval_ms: u64,
    json: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            workers,
            queue_size,
            tasks,
            task_ms,
            resize_to,
            close_after,
            stats_interval_ms,
            json,
        } => run_command(RunOptions {
            workers,
            queue_size,
            tasks,
            task_ms,
            resize_to,
            close_after,
            stats_interval_ms,
            json,
        })?,
    }

    Ok(())
}

fn run_command(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = PoolConfig::new(options.workers, options.queue_size)
        .thread_name_prefix("taskpool-cli");
    let pool = Arc::new(
        Pool::with_config(config).map_err(|err| err.with_context("starting pool"))?,
    );
    let finished = Arc::new(AtomicUsize::new(0));
    let task_duration = Duration::from_millis(options.task_ms);
    let started_at = Instant::now();
    // Never wait for more tasks than will be submitted.
    let close_after = options.close_after.map(|count| count.min(options.tasks));

    let reporting = Arc::new(AtomicBool::new(true));
    let reporter = spawn_reporter(
        Arc::clone(&pool),
        Arc::clone(&reporting),
        Duration::from_millis(options.stats_interval_ms.max(50)),
        options.tasks,
    );

    let mut skipped = 0;
    let mut closed = false;
    for index in 0..options.tasks {
        if close_after.is_some_and(|count| finished.load(Ordering::Acquire) >= count) {
            pool.close();
            closed = true;
            skipped = options.tasks - index;
            break;
        }

        if index == options.tasks / 2 {
            if let Some(target) = options.resize_to {
                pool.resize(target).map_err(|err| {
                    err.with_context(format!("resizing pool to {target} workers"))
                })?;
                eprintln!("resized pool to {target} workers after {index} submissions");
            }
        }

        let finished = Arc::clone(&finished);
        pool.submit(move || {
            thread::sleep(task_duration);
            finished.fetch_add(1, Ordering::AcqRel);
        })
        .map_err(|err| err.with_context(format!("submitting task {index}")))?;
    }

    let wait_for = close_after.unwrap_or(options.tasks);
    if !closed {
        while finished.load(Ordering::Acquire) < wait_for {
            thread::sleep(Duration::from_millis(5));
        }
    }

    let abandoned = if close_after.is_some() {
        if !closed {
            pool.close();
        }
        let abandoned = pool.queued();
        eprintln!(
            "closed pool after {} finished tasks; {abandoned} queued tasks abandoned, {skipped} never submitted",
            finished.load(Ordering::Acquire)
        );
        abandoned
    } else {
        0
    };

    reporting.store(false, Ordering::Release);
    if reporter.join().is_err() {
        eprintln!("progress reporter panicked");
    }

    let snapshot = pool.runtime_snapshot();
    let elapsed = started_at.elapsed();

    match Arc::try_unwrap(pool) {
        Ok(pool) => pool
            .shutdown()
            .map_err(|err| err.with_context("joining worker threads"))?,
        Err(_) => eprintln!("pool still shared; skipping worker join"),
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_summary(&snapshot, elapsed, finished.load(Ordering::Acquire), abandoned);
    }

    Ok(())
}

fn spawn_reporter(
    pool: Arc<Pool>,
    running: Arc<AtomicBool>,
    interval: Duration,
    total: usize,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut last_report = Instant::now();
        while running.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(10));
            if last_report.elapsed() < interval {
                continue;
            }
            last_report = Instant::now();

            let snapshot = pool.runtime_snapshot();
            let done = snapshot.completed + snapshot.failed;
            eprintln!(
                "[{}] {done}/{total} done | queued {}/{} | workers {} live ({} on roster)",
                format_duration(snapshot.elapsed),
                snapshot.queued,
                snapshot.queue_capacity,
                snapshot.live_workers,
                snapshot.workers.len(),
            );
        }
    })
}

fn print_summary(
    snapshot: &PoolRuntimeSnapshot,
    elapsed: Duration,
    finished: usize,
    abandoned: usize,
) {
    let throughput = if elapsed.is_zero() {
        0.0
    } else {
        finished as f64 / elapsed.as_secs_f64()
    };

    println!("wall time:   {}", format_duration(elapsed));
    println!("finished:    {finished}");
    println!("failed:      {}", snapshot.failed);
    println!("abandoned:   {abandoned}");
    println!("throughput:  {throughput:.1} tasks/s");
    println!("workers:");
    for worker in &snapshot.workers {
        println!(
            "  w{:<3} tasks {:>5}  busy {:>9}  idle {:>9}  util {:>5.1}%",
            worker.worker_id,
            worker.tasks_completed,
            format_duration(worker.busy),
            format_duration(worker.idle),
            worker.utilization * 100.0,
        );
    }
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let millis = duration.subsec_millis();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;

    if minutes > 0 {
        format!("{minutes:02}:{seconds:02}")
    } else {
        format!("{seconds}.{millis:03}s")
    }
}
