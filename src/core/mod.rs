//! Admission control, tier accounting and the submission contract.

pub mod availability;
pub mod error;
pub mod priority_level;
pub mod reservation;
pub mod stats;
pub mod submission;
pub mod tracker;

pub use availability::{TaskAvailability, LEVEL_MIN};
pub use error::{AdmissionError, AppResult};
pub use priority_level::PriorityLevelState;
pub use reservation::{reservation_token, Reservation, ReservationRegistry, ReservationSummary};
pub use stats::AvailabilityStats;
pub use submission::{SubmitFn, TaskDescriptor, TaskWork};
pub use tracker::{ProcessSlot, TaskId, TaskTracker};
