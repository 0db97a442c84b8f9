//! Bounded queue with admission-controlled overload relief.
//!
//! Items are drained by one dedicated thread. When the backlog grows past the
//! configured threshold, [`ReliefQueue::process`] asks the runtime for extra drain
//! capacity by handing a long-running task to the injected [`SubmitFn`], so relief
//! work competes for admission slots like everything else instead of spawning
//! threads on its own. At most `overload_max_tasks` such tasks are alive at once.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, ReliefQueueConfig};
use crate::core::{SubmitFn, TaskDescriptor};

/// Errors from relief queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue is at capacity.
    #[error("queue full: {0}")]
    Full(String),
    /// The queue was shut down.
    #[error("queue shut down: {0}")]
    Shutdown(String),
    /// Configuration rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The drain thread could not be started.
    #[error("failed to spawn drain thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Consumer of drained items.
pub trait BatchHandler<T>: Send + Sync + 'static {
    /// Handle one batch, oldest item first.
    fn handle(&self, batch: Vec<T>);
}

impl<T, F> BatchHandler<T> for F
where
    F: Fn(Vec<T>) + Send + Sync + 'static,
{
    fn handle(&self, batch: Vec<T>) {
        self(batch);
    }
}

/// Counters exported by [`ReliefQueue::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReliefQueueStats {
    /// Items waiting.
    pub depth: usize,
    /// Items handed to the handler.
    pub processed: u64,
    /// Items rejected because the queue was full.
    pub dropped: u64,
    /// Items in batches whose handler panicked.
    pub failed: u64,
    /// Extra drain tasks alive.
    pub overload_tasks: usize,
    /// Extra drain tasks requested over the queue's lifetime.
    pub overload_requests: u64,
}

struct Shared<T> {
    name: String,
    config: ReliefQueueConfig,
    rx: Receiver<T>,
    handler: Arc<dyn BatchHandler<T>>,
    processed: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    overload_requests: AtomicU64,
    shutdown: AtomicBool,
}

impl<T: 'static> Shared<T> {
    fn depth(&self) -> usize {
        self.rx.len()
    }

    fn overloaded(&self) -> bool {
        self.depth() > self.config.overload_threshold
    }

    /// Pull up to one batch without blocking.
    fn take_batch(&self, first: Option<T>) -> Vec<T> {
        let mut batch = Vec::with_capacity(self.config.drain_batch);
        batch.extend(first);
        while batch.len() < self.config.drain_batch {
            match self.rx.try_recv() {
                Ok(item) => batch.push(item),
                Err(_) => break,
            }
        }
        batch
    }

    /// Hand a batch to the handler. A panicking handler costs the batch, not
    /// the calling thread.
    fn dispatch(&self, batch: Vec<T>) {
        let n = batch.len() as u64;
        let handler = &self.handler;
        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(batch))) {
            Ok(()) => {
                self.processed.fetch_add(n, Ordering::Relaxed);
            }
            Err(_) => {
                self.failed.fetch_add(n, Ordering::Relaxed);
                error!(queue = %self.name, items = n, "batch handler panicked, batch lost");
            }
        }
    }

    /// Drain until the backlog is back under the threshold, at most one queue's
    /// worth of batches.
    fn relieve(&self) {
        let max_batches = self.config.capacity.div_ceil(self.config.drain_batch);
        let mut batches = 0;
        while batches < max_batches && self.overloaded() && !self.shutdown.load(Ordering::Acquire)
        {
            let batch = self.take_batch(None);
            if batch.is_empty() {
                break;
            }
            self.dispatch(batch);
            batches += 1;
        }
        debug!(queue = %self.name, batches, depth = self.depth(), "overload drain finished");
    }
}

/// Releases one overload-task permit when dropped, on every exit path.
struct OverloadPermit {
    count: Arc<AtomicUsize>,
}

impl Drop for OverloadPermit {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Bounded work queue drained by a dedicated thread plus admission-controlled
/// relief tasks.
pub struct ReliefQueue<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    /// Sender, `None` once shut down.
    tx: Mutex<Option<Sender<T>>>,
    overload_tasks: Arc<AtomicUsize>,
    submit: SubmitFn,
    drain_thread: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> ReliefQueue<T> {
    /// Create the queue and start its drain thread.
    ///
    /// # Errors
    ///
    /// Invalid configuration or a failed thread spawn.
    pub fn new(
        name: impl Into<String>,
        config: ReliefQueueConfig,
        handler: impl BatchHandler<T>,
        submit: SubmitFn,
    ) -> Result<Self, QueueError> {
        config.validate()?;
        let name = name.into();
        let (tx, rx) = bounded::<T>(config.capacity);

        let shared = Arc::new(Shared {
            name: name.clone(),
            config,
            rx,
            handler: Arc::new(handler),
            processed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            overload_requests: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        });

        let worker = Arc::clone(&shared);
        let drain_thread = thread::Builder::new()
            .name(format!("relief-{name}"))
            .spawn(move || drain_loop(&worker))?;

        info!(
            queue = %name,
            capacity = shared.config.capacity,
            threshold = shared.config.overload_threshold,
            max_overload_tasks = shared.config.overload_max_tasks,
            "relief queue started"
        );

        Ok(Self {
            shared,
            tx: Mutex::new(Some(tx)),
            overload_tasks: Arc::new(AtomicUsize::new(0)),
            submit,
            drain_thread: Mutex::new(Some(drain_thread)),
        })
    }

    /// Queue name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Enqueue an item without blocking.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Full`] at capacity
    /// - [`QueueError::Shutdown`] after [`shutdown`](Self::shutdown)
    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Err(QueueError::Shutdown(self.shared.name.clone()));
        };
        match tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(queue = %self.shared.name, "relief queue full, item dropped");
                Err(QueueError::Full(self.shared.name.clone()))
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(QueueError::Shutdown(self.shared.name.clone()))
            }
        }
    }

    /// Items waiting.
    pub fn len(&self) -> usize {
        self.shared.depth()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backlog exceeds the configured threshold.
    pub fn overloaded(&self) -> bool {
        self.shared.overloaded()
    }

    /// Extra drain tasks alive.
    pub fn overload_tasks(&self) -> usize {
        self.overload_tasks.load(Ordering::Acquire)
    }

    /// Request one extra drain task if overloaded and under the task ceiling.
    ///
    /// Returns whether a task was handed to the submission callback. The permit
    /// travels inside the task and is released when the task finishes or when
    /// the callback drops it unrun.
    pub fn process(&self) -> bool {
        if self.shared.shutdown.load(Ordering::Acquire) || !self.overloaded() {
            return false;
        }
        let Some(permit) = self.try_acquire_permit() else {
            debug!(queue = %self.shared.name, "overload task ceiling reached");
            return false;
        };

        let shared = Arc::clone(&self.shared);
        let depth = shared.depth();
        let descriptor = TaskDescriptor::blocking(
            format!("{}-overload-drain", self.shared.name),
            Some(self.shared.config.overload_priority),
            move || {
                let _permit = permit;
                shared.relieve();
            },
        )
        .long_running();

        self.shared.overload_requests.fetch_add(1, Ordering::Relaxed);
        warn!(
            queue = %self.shared.name,
            depth,
            task = %descriptor.id,
            "queue overloaded, requesting drain task"
        );
        (self.submit)(descriptor);
        true
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ReliefQueueStats {
        ReliefQueueStats {
            depth: self.len(),
            processed: self.shared.processed.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            overload_tasks: self.overload_tasks(),
            overload_requests: self.shared.overload_requests.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting items, let the drain thread flush what is queued, and join it.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        {
            let mut tx = self.tx.lock();
            *tx = None;
        }
        let handle = self.drain_thread.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(queue = %self.shared.name, "drain thread panicked");
            }
        }
        info!(queue = %self.shared.name, processed = self.shared.processed.load(Ordering::Relaxed), "relief queue shut down");
    }

    /// CAS loop so concurrent callers never overshoot the ceiling.
    fn try_acquire_permit(&self) -> Option<OverloadPermit> {
        let max = self.shared.config.overload_max_tasks;
        let mut current = self.overload_tasks.load(Ordering::Acquire);
        loop {
            if current >= max {
                return None;
            }
            match self.overload_tasks.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(OverloadPermit {
                        count: Arc::clone(&self.overload_tasks),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }
}

impl<T: Send + 'static> Drop for ReliefQueue<T> {
    fn drop(&mut self) {
        // Don't join here; the drain thread exits once the sender is gone.
        if !self.shared.shutdown.swap(true, Ordering::AcqRel) {
            let mut tx = self.tx.lock();
            *tx = None;
        }
    }
}

/// Blocking drain loop; exits when every sender is dropped and the queue is empty.
fn drain_loop<T: 'static>(shared: &Shared<T>) {
    debug!(queue = %shared.name, "drain thread started");
    while let Ok(first) = shared.rx.recv() {
        let batch = shared.take_batch(Some(first));
        shared.dispatch(batch);
    }
    debug!(queue = %shared.name, "drain thread exiting");
}
