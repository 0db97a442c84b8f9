//! Infrastructure consumers of the admission controller.

pub mod queue;
pub use queue::{BatchHandler, QueueError, ReliefQueue, ReliefQueueStats};
