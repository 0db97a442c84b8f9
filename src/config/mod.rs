//! Configuration models for the admission controller and relief queues.

pub mod admission;

pub use admission::{AdmissionConfig, BulkheadConfig, ConfigError, ReliefQueueConfig, ENV_PREFIX};
