//! # Tier Admission
//!
//! Admission control and priority-tier slot accounting for a microservice runtime.
//!
//! Every unit of work the runtime wants to execute (message handling, scheduled
//! jobs, overload-relief drains) asks a shared [`TaskAvailability`](core::TaskAvailability)
//! how many slots it may use at its priority tier. The controller answers from one
//! global pool while it has room, and from per-tier bulkheads once the pool is
//! saturated, so a busy tier can never starve the tiers above it of their
//! guaranteed capacity.
//!
//! ## Key Features
//!
//! - **Lock-free accounting**: atomics and concurrent maps only, nothing blocks
//! - **Bulkheads**: guaranteed minimum capacity per tier with downward fallback
//! - **Speculative reservations**: hold slots before the exact task count is known
//! - **Killed-task reconciliation**: idempotent release tolerates tasks reclaimed by
//!   a watchdog that later report back anyway
//! - **Internal tier**: framework housekeeping is never blocked by user load
//! - **Overload relief**: queues request extra drain capacity through admission
//!
//! ```rust
//! use tier_admission::core::{TaskAvailability, TaskTracker};
//!
//! let availability = TaskAvailability::new(3, 10);
//! assert!(availability.bulkhead_reserve(2, 2, 0));
//!
//! let task = TaskTracker::new(0);
//! if availability.level(0) > 0 {
//!     availability.increment(&task).unwrap();
//!     // ... run the work ...
//!     availability.decrement(&task, false).unwrap();
//! }
//! assert_eq!(availability.count(), 10);
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Admission controller, tier state, reservations and the submission contract.
pub mod core;
/// Configuration models.
pub mod config;
/// Builders to construct components from configuration.
pub mod builders;
/// Queue consumers of the admission controller.
pub mod infra;
/// Runtime adapters that execute admitted work.
#[cfg(feature = "tokio-runtime")]
pub mod runtime;
/// Shared utilities.
pub mod util;
