//! Caller-owned task trackers.
//!
//! A [`TaskTracker`] is created by whoever dispatches work and is shared (usually
//! behind an `Arc`) between the task itself and any watchdog enforcing its time
//! budget. The admission controller only reads and stamps its fields.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Allocate the next identifier from the process-wide sequence.
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequential slot number handed out by the controller on increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessSlot(pub u64);

impl fmt::Display for ProcessSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-task bookkeeping referenced by the admission controller.
#[derive(Debug)]
pub struct TaskTracker {
    id: TaskId,
    priority: Option<usize>,
    slot: OnceLock<ProcessSlot>,
    killed: AtomicBool,
}

impl TaskTracker {
    /// Tracker for user work at the given priority tier.
    pub fn new(priority: usize) -> Self {
        Self {
            id: TaskId::next(),
            priority: Some(priority),
            slot: OnceLock::new(),
            killed: AtomicBool::new(false),
        }
    }

    /// Tracker for framework bookkeeping, exempt from the global ceiling.
    pub fn internal() -> Self {
        Self {
            id: TaskId::next(),
            priority: None,
            slot: OnceLock::new(),
            killed: AtomicBool::new(false),
        }
    }

    /// Tracker reusing an identifier allocated elsewhere, e.g. by a
    /// [`TaskDescriptor`](super::TaskDescriptor). `None` marks internal work.
    pub const fn with_id(id: TaskId, priority: Option<usize>) -> Self {
        Self {
            id,
            priority,
            slot: OnceLock::new(),
            killed: AtomicBool::new(false),
        }
    }

    /// Task identifier.
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Priority tier, `None` for internal work.
    pub const fn priority(&self) -> Option<usize> {
        self.priority
    }

    /// Whether this is framework-internal work.
    pub const fn is_internal(&self) -> bool {
        self.priority.is_none()
    }

    /// Slot assigned at increment time, if any.
    pub fn process_slot(&self) -> Option<ProcessSlot> {
        self.slot.get().copied()
    }

    /// Whether a watchdog reclaimed this task.
    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }

    /// Mark the task as reclaimed by a time-budget watchdog.
    pub fn mark_killed(&self) {
        self.killed.store(true, Ordering::Release);
    }

    /// Stamp the slot. Fails with the existing slot if one was already assigned.
    pub(crate) fn assign_slot(&self, slot: ProcessSlot) -> Result<(), ProcessSlot> {
        self.slot.set(slot).map_err(|_| self.process_slot().unwrap_or(slot))
    }
}
