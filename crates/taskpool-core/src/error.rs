use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error(
        "invalid configuration: worker count and queue size must be at least 1 (workers {workers}, queue size {queue_size})"
    )]
    InvalidConfiguration { workers: usize, queue_size: usize },
    #[error("task queue is full")]
    QueueFull,
    #[error("task queue is disconnected")]
    QueueDisconnected,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("global pool is already initialized")]
    GlobalAlreadyInitialized,
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<PoolError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PoolError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns true when this error, or the error it wraps, is a configuration error.
    pub fn is_invalid_configuration(&self) -> bool {
        match self {
            Self::InvalidConfiguration { .. } => true,
            Self::Context { source, .. } => source.is_invalid_configuration(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;
