//! Builders wiring configuration into live components.

pub mod admission_builder;

pub use admission_builder::{build_availability, build_relief_queue};
#[cfg(feature = "tokio-runtime")]
pub use admission_builder::build_runtime;
