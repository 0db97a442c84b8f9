//! Error types for admission-control operations.

use thiserror::Error;

use super::tracker::{ProcessSlot, TaskId};

/// Usage errors raised by the admission controller.
///
/// These indicate a caller broke the single-registration contract. Routine
/// contention and bad configuration are reported through `bool` returns instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// The tracker was already incremented and still owns a slot.
    #[error("task {task} already registered in slot {slot}")]
    AlreadyRegistered {
        /// Offending task.
        task: TaskId,
        /// Slot the task already holds.
        slot: ProcessSlot,
    },
    /// Decrement was called on a tracker that was never assigned a slot.
    #[error("task {task} has no assigned process slot")]
    MissingSlot {
        /// Offending task.
        task: TaskId,
    },
    /// Tracker priority lies outside the configured tier range.
    #[error("priority {priority} outside tier range 0..={max}")]
    InvalidPriority {
        /// Requested priority.
        priority: usize,
        /// Highest configured tier.
        max: usize,
    },
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
