//! Tests for error types

use tier_admission::config::ConfigError;
use tier_admission::core::{AdmissionError, ProcessSlot, TaskId};
use tier_admission::infra::QueueError;

#[test]
fn test_already_registered_error() {
    let err = AdmissionError::AlreadyRegistered {
        task: TaskId(1),
        slot: ProcessSlot(2),
    };
    assert_eq!(format!("{}", err), "task 1 already registered in slot 2");
}

#[test]
fn test_missing_slot_error() {
    let err = AdmissionError::MissingSlot { task: TaskId(9) };
    assert_eq!(format!("{}", err), "task 9 has no assigned process slot");
}

#[test]
fn test_config_error() {
    let err = ConfigError::Invalid("levels must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: levels must be greater than 0"
    );
}

#[test]
fn test_queue_errors() {
    assert_eq!(format!("{}", QueueError::Full("logs".into())), "queue full: logs");
    assert_eq!(
        format!("{}", QueueError::Shutdown("logs".into())),
        "queue shut down: logs"
    );
}
