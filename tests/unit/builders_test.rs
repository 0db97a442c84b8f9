//! Tests for component builders

use std::sync::Arc;

use tier_admission::builders::{build_availability, build_relief_queue};
use tier_admission::config::{AdmissionConfig, BulkheadConfig};
use tier_admission::core::{SubmitFn, TaskDescriptor};

#[test]
fn test_build_availability_applies_bulkheads() {
    let cfg = AdmissionConfig {
        levels: 2,
        max_concurrent: 8,
        bulkheads: vec![BulkheadConfig {
            level: 1,
            slots: 3,
            overage: 0,
        }],
        ..AdmissionConfig::default()
    };
    let ta = build_availability(&cfg).unwrap();
    assert_eq!(ta.levels(), 2);
    assert_eq!(ta.max_concurrent(), 8);
    assert_eq!(ta.level_state(1).unwrap().bulkhead(), 3);
}

#[test]
fn test_build_relief_queue() {
    let cfg = AdmissionConfig::default();
    let submit: SubmitFn = Arc::new(|_d: TaskDescriptor| {});
    let q = build_relief_queue("metrics", &cfg, |_b: Vec<String>| {}, submit).unwrap();
    assert_eq!(q.name(), "metrics");
    assert!(q.is_empty());
    q.shutdown();
}

#[cfg(feature = "tokio-runtime")]
#[tokio::test]
async fn test_build_runtime() {
    let cfg = AdmissionConfig {
        levels: 1,
        max_concurrent: 2,
        ..AdmissionConfig::default()
    };
    let (availability, spawner) =
        tier_admission::builders::build_runtime(&cfg, tokio::runtime::Handle::current()).unwrap();
    assert!(Arc::ptr_eq(&availability, spawner.availability()));
}
