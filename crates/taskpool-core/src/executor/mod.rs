pub mod pool;
pub mod task;
pub mod worker;

pub use pool::{Pool, PoolRuntimeSnapshot};
pub use task::Job;
pub use worker::WorkerRuntimeSnapshot;
