//! Bounded background-task executor.
//!
//! A [`Pool`] owns a fixed-capacity FIFO queue and a roster of worker threads
//! draining it. Submitting blocks while the queue is full; the roster can be
//! resized or closed at runtime without losing queued work.

pub mod config;
pub mod error;
pub mod executor;
pub mod global;
pub mod telemetry;

pub use config::PoolConfig;
pub use error::{PoolError, Result};
pub use executor::{Job, Pool, PoolRuntimeSnapshot, WorkerRuntimeSnapshot};
pub use global::{global, init_global};
pub use telemetry::{DefaultWorkerTelemetry, TelemetrySnapshot, WorkerTelemetry};
