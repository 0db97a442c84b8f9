//! Queue backends.

pub mod relief;

pub use relief::{BatchHandler, QueueError, ReliefQueue, ReliefQueueStats};
