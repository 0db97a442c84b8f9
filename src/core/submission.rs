//! Submission contract between work producers and whatever executes admitted work.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::tracker::TaskId;

/// Work carried by a [`TaskDescriptor`].
pub enum TaskWork {
    /// Blocking closure, run off the async workers.
    Blocking(Box<dyn FnOnce() + Send + 'static>),
    /// Future polled on the async runtime.
    Async(Pin<Box<dyn Future<Output = ()> + Send + 'static>>),
}

impl fmt::Debug for TaskWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocking(_) => f.write_str("Blocking(..)"),
            Self::Async(_) => f.write_str("Async(..)"),
        }
    }
}

/// A unit of work asking for an admission slot.
#[derive(Debug)]
pub struct TaskDescriptor {
    /// Identifier, also used for log correlation.
    pub id: TaskId,
    /// Human-readable name.
    pub name: String,
    /// Tier to charge; `None` for internal work.
    pub priority: Option<usize>,
    /// Exempt from the per-task time budget.
    pub long_running: bool,
    /// The work itself.
    pub work: TaskWork,
}

impl TaskDescriptor {
    /// Descriptor for a blocking closure.
    pub fn blocking<F>(name: impl Into<String>, priority: Option<usize>, work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id: TaskId::next(),
            name: name.into(),
            priority,
            long_running: false,
            work: TaskWork::Blocking(Box::new(work)),
        }
    }

    /// Descriptor for a future.
    pub fn future<F>(name: impl Into<String>, priority: Option<usize>, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            id: TaskId::next(),
            name: name.into(),
            priority,
            long_running: false,
            work: TaskWork::Async(Box::pin(work)),
        }
    }

    /// Mark as long-running.
    #[must_use]
    pub const fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }
}

/// Callback that takes ownership of admitted work.
pub type SubmitFn = Arc<dyn Fn(TaskDescriptor) + Send + Sync + 'static>;
