//! Tests for task trackers and descriptors

use tier_admission::core::{TaskDescriptor, TaskId, TaskTracker, TaskWork};

#[test]
fn test_tracker_with_descriptor_id() {
    let d = TaskDescriptor::blocking("job", Some(2), || {});
    let t = TaskTracker::with_id(d.id, d.priority);
    assert_eq!(t.id(), d.id);
    assert_eq!(t.priority(), Some(2));
    assert!(t.process_slot().is_none());
}

#[test]
fn test_task_ids_increase() {
    let a = TaskId::next();
    let b = TaskId::next();
    assert!(b > a);
}

#[test]
fn test_descriptor_variants() {
    let blocking = TaskDescriptor::blocking("b", None, || {});
    assert!(matches!(blocking.work, TaskWork::Blocking(_)));
    assert!(!blocking.long_running);

    let fut = TaskDescriptor::future("f", Some(0), async {}).long_running();
    assert!(matches!(fut.work, TaskWork::Async(_)));
    assert!(fut.long_running);
    assert_eq!(format!("{:?}", fut.work), "Async(..)");
}
