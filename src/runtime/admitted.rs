//! Tokio spawner that only runs work the admission controller lets in.
//!
//! Each submission is charged to a tier, run on the runtime, watched against the
//! configured time budget and released on every exit path, panics included.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use crate::core::{
    AdmissionError, ProcessSlot, SubmitFn, TaskAvailability, TaskDescriptor, TaskId, TaskTracker,
    TaskWork,
};

/// Outcome of [`AdmittedSpawner::submit`].
#[derive(Debug)]
pub enum Admission {
    /// The task holds `slot` and is running.
    Started(ProcessSlot),
    /// No capacity at the requested tier; the work is handed back untouched.
    Deferred(TaskDescriptor),
    /// The controller refused the task outright.
    Rejected(AdmissionError),
}

struct Inner {
    handle: tokio::runtime::Handle,
    availability: Arc<TaskAvailability>,
    time_budget: Duration,
    running: DashMap<TaskId, Arc<TaskTracker>>,
    deferred: AtomicU64,
    shutdown: AtomicBool,
}

/// Admission-controlled spawner over a tokio runtime.
#[derive(Clone)]
pub struct AdmittedSpawner {
    inner: Arc<Inner>,
}

impl AdmittedSpawner {
    /// Spawner over an existing runtime handle.
    pub fn new(
        handle: tokio::runtime::Handle,
        availability: Arc<TaskAvailability>,
        time_budget: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                handle,
                availability,
                time_budget,
                running: DashMap::new(),
                deferred: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Controller this spawner charges.
    pub fn availability(&self) -> &Arc<TaskAvailability> {
        &self.inner.availability
    }

    /// Tasks currently holding a slot through this spawner.
    pub fn running(&self) -> usize {
        self.inner.running.len()
    }

    /// Submissions handed back for lack of capacity.
    pub fn deferred(&self) -> u64 {
        self.inner.deferred.load(Ordering::Relaxed)
    }

    /// Admit and start a task, or hand it back.
    ///
    /// Internal work (no priority) is always admitted. User work needs a
    /// positive [`TaskAvailability::level`] at its tier.
    pub fn submit(&self, descriptor: TaskDescriptor) -> Admission {
        let inner = &self.inner;
        if inner.shutdown.load(Ordering::Acquire) {
            inner.deferred.fetch_add(1, Ordering::Relaxed);
            debug!(task = %descriptor.id, "spawner shut down, deferring");
            return Admission::Deferred(descriptor);
        }

        if let Some(priority) = descriptor.priority {
            if inner.availability.level(priority) <= 0 {
                inner.deferred.fetch_add(1, Ordering::Relaxed);
                debug!(task = %descriptor.id, priority, "no capacity, deferring");
                return Admission::Deferred(descriptor);
            }
        }

        let tracker = Arc::new(TaskTracker::with_id(descriptor.id, descriptor.priority));
        let slot = match inner.availability.increment(&tracker) {
            Ok(slot) => slot,
            Err(e) => {
                error!(task = %descriptor.id, error = %e, "admission rejected");
                return Admission::Rejected(e);
            }
        };
        inner.running.insert(tracker.id(), Arc::clone(&tracker));

        let guard = SlotGuard {
            inner: Arc::clone(inner),
            tracker: Arc::clone(&tracker),
        };

        let name = descriptor.name;
        let work: Pin<Box<dyn Future<Output = ()> + Send>> = match descriptor.work {
            TaskWork::Async(fut) => fut,
            TaskWork::Blocking(f) => {
                let join = inner.handle.spawn_blocking(f);
                Box::pin(async move {
                    if let Err(e) = join.await {
                        warn!(error = %e, "blocking task did not complete cleanly");
                    }
                })
            }
        };
        let budget = (!descriptor.long_running).then_some(inner.time_budget);

        info!(task = %tracker.id(), %slot, name = %name, "task admitted");
        inner
            .handle
            .spawn(run_watched(work, guard, tracker, budget));
        Admission::Started(slot)
    }

    /// Adapt into the callback shape consumed by queues and dispatchers.
    /// Deferred and rejected work is dropped.
    pub fn into_submit_fn(self) -> SubmitFn {
        Arc::new(move |descriptor: TaskDescriptor| match self.submit(descriptor) {
            Admission::Started(_) => {}
            Admission::Deferred(d) => debug!(task = %d.id, name = %d.name, "dropping deferred task"),
            Admission::Rejected(e) => warn!(error = %e, "dropping rejected task"),
        })
    }

    /// Stop admitting and force-clear every slot still held. Returns how many
    /// slots were cleared.
    pub fn shutdown(&self) -> usize {
        let inner = &self.inner;
        if inner.shutdown.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let ids: Vec<TaskId> = inner.running.iter().map(|e| *e.key()).collect();
        let mut cleared = 0;
        for id in ids {
            if let Some((_, tracker)) = inner.running.remove(&id) {
                if let Err(e) = inner.availability.decrement(&tracker, true) {
                    error!(task = %id, error = %e, "force clear failed");
                } else {
                    cleared += 1;
                }
            }
        }
        info!(cleared, "admitted spawner shut down");
        cleared
    }
}

/// Releases the slot when the task finishes, fails or unwinds.
struct SlotGuard {
    inner: Arc<Inner>,
    tracker: Arc<TaskTracker>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.inner.running.remove(&self.tracker.id());
        if let Err(e) = self.inner.availability.decrement(&self.tracker, false) {
            error!(task = %self.tracker.id(), error = %e, "slot release failed");
        }
    }
}

async fn run_watched(
    work: Pin<Box<dyn Future<Output = ()> + Send>>,
    guard: SlotGuard,
    tracker: Arc<TaskTracker>,
    budget: Option<Duration>,
) {
    let _guard = guard;
    let mut work = work;
    let Some(budget) = budget else {
        work.await;
        return;
    };

    tokio::select! {
        () = &mut work => {}
        () = tokio::time::sleep(budget) => {
            tracker.mark_killed();
            warn!(
                task = %tracker.id(),
                budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                "task exceeded time budget, marked killed"
            );
            work.await;
        }
    }
}
