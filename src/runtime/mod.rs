//! Runtime adapters that execute admitted work.

pub mod admitted;

pub use admitted::{Admission, AdmittedSpawner};
