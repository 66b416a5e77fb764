//! Process-wide default pool.
//!
//! The default pool is built lazily on the first call to [`global`], from
//! [`PoolConfig::from_env`]. A program that wants a different configuration
//! must call [`init_global`] before anything touches [`global`]; once the pool
//! exists its configuration is fixed, though it can still be resized. The
//! default pool lives until the process exits and is never torn down.

use std::sync::OnceLock;

use tracing::info;

use crate::config::PoolConfig;
use crate::executor::Pool;
use crate::error::{PoolError, Result};
use crate::telemetry::tags;

static GLOBAL_POOL: OnceLock<Pool> = OnceLock::new();

/// Returns the process-wide pool, creating it on first use.
pub fn global() -> Result<&'static Pool> {
    if let Some(pool) = GLOBAL_POOL.get() {
        return Ok(pool);
    }
    install(PoolConfig::from_env()).map(|(pool, _)| pool)
}

/// Installs the process-wide pool with an explicit configuration.
///
/// Fails with [`PoolError::GlobalAlreadyInitialized`] if the pool already exists.
pub fn init_global(config: PoolConfig) -> Result<&'static Pool> {
    if GLOBAL_POOL.get().is_some() {
        return Err(PoolError::GlobalAlreadyInitialized);
    }
    match install(config)? {
        (pool, true) => Ok(pool),
        (_, false) => Err(PoolError::GlobalAlreadyInitialized),
    }
}

/// Builds a pool and races to install it. The flag reports whether ours won;
/// a losing pool is dropped, which closes it.
fn install(config: PoolConfig) -> Result<(&'static Pool, bool)> {
    let candidate = Pool::with_config(config.clone())?;
    let mut installed = false;
    let pool = GLOBAL_POOL.get_or_init(|| {
        installed = true;
        candidate
    });
    if installed {
        info!(
            target: tags::TARGET_GLOBAL,
            workers = config.workers,
            queue_size = config.queue_size,
            "global pool initialized"
        );
    }
    Ok((pool, installed))
}
