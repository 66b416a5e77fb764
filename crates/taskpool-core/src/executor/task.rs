use std::fmt;
use std::time::{Duration, Instant};

/// Boxed unit of work. Arguments travel inside the closure's captures.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// One queued unit of work.
pub(crate) struct Task {
    id: u64,
    submitted_at: Instant,
    job: Job,
}

impl Task {
    pub(crate) fn new(id: u64, job: Job) -> Self {
        Self {
            id,
            submitted_at: Instant::now(),
            job,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Time spent in the queue so far.
    pub(crate) fn queue_wait(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    pub(crate) fn run(self) {
        (self.job)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("submitted_at", &self.submitted_at)
            .finish_non_exhaustive()
    }
}
