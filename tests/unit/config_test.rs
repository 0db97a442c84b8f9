//! Tests for configuration validation

use std::env;

use tier_admission::config::{
    AdmissionConfig, BulkheadConfig, ConfigError, ReliefQueueConfig, ENV_PREFIX,
};

fn valid() -> AdmissionConfig {
    AdmissionConfig {
        levels: 3,
        max_concurrent: 20,
        bulkheads: vec![BulkheadConfig {
            level: 2,
            slots: 4,
            overage: 1,
        }],
        task_time_budget_ms: 1_000,
        relief: ReliefQueueConfig::default(),
    }
}

#[test]
fn test_admission_config_validation() {
    assert!(valid().validate().is_ok());
}

#[test]
fn test_admission_config_invalid_levels() {
    let cfg = AdmissionConfig { levels: 0, ..valid() };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_admission_config_invalid_max_concurrent() {
    let cfg = AdmissionConfig {
        max_concurrent: 0,
        ..valid()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_admission_config_negative_bulkhead() {
    let cfg = AdmissionConfig {
        bulkheads: vec![BulkheadConfig {
            level: 0,
            slots: -1,
            overage: 0,
        }],
        ..valid()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_relief_priority_must_exist() {
    let mut cfg = valid();
    cfg.relief.overload_priority = 3;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_relief_config_invalid_batch() {
    let relief = ReliefQueueConfig {
        drain_batch: 0,
        ..ReliefQueueConfig::default()
    };
    assert!(relief.validate().is_err());
}

#[test]
fn test_admission_config_from_json() {
    let json = r#"{
        "levels": 4,
        "max_concurrent": 64,
        "bulkheads": [
            { "level": 3, "slots": 8, "overage": 2 },
            { "level": 1, "slots": 2 }
        ],
        "relief": {
            "capacity": 5000,
            "overload_threshold": 500
        }
    }"#;

    let cfg = AdmissionConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.levels, 4);
    assert_eq!(cfg.bulkheads[1].overage, 0);
    assert_eq!(cfg.task_time_budget_ms, 30_000);
    assert_eq!(cfg.relief.drain_batch, ReliefQueueConfig::default().drain_batch);
}

#[test]
fn test_admission_config_from_json_rejects_invalid() {
    let json = r#"{ "levels": 1, "max_concurrent": 8, "bulkheads": [{ "level": 1, "slots": 1 }] }"#;
    assert!(AdmissionConfig::from_json_str(json).is_err());
    assert!(AdmissionConfig::from_json_str("not json").is_err());
}

const ENV_OVERRIDES: [(&str, &str); 6] = [
    ("LEVELS", "5"),
    ("RELIEF_CAPACITY", "2000"),
    ("RELIEF_OVERLOAD_THRESHOLD", "200"),
    ("RELIEF_OVERLOAD_MAX_TASKS", "3"),
    ("RELIEF_DRAIN_BATCH", "50"),
    ("RELIEF_OVERLOAD_PRIORITY", "4"),
];

fn set_env(suffix: &str, value: &str) {
    env::set_var(format!("{ENV_PREFIX}{suffix}"), value);
}

fn clear_env() {
    for (suffix, _) in ENV_OVERRIDES {
        env::remove_var(format!("{ENV_PREFIX}{suffix}"));
    }
    env::remove_var(format!("{ENV_PREFIX}MAX_CONCURRENT"));
}

// Env vars are process-wide, so every from_env case runs in this one test.
#[test]
fn test_admission_config_from_env() {
    for (suffix, value) in ENV_OVERRIDES {
        set_env(suffix, value);
    }

    let cfg = AdmissionConfig::from_env().unwrap();
    assert_eq!(cfg.levels, 5);
    assert_eq!(cfg.relief.capacity, 2000);
    assert_eq!(cfg.relief.overload_threshold, 200);
    assert_eq!(cfg.relief.overload_max_tasks, 3);
    assert_eq!(cfg.relief.drain_batch, 50);
    assert_eq!(cfg.relief.overload_priority, 4);
    assert_eq!(cfg.task_time_budget_ms, 30_000);

    // Parses, but names a tier that does not exist.
    set_env("RELIEF_OVERLOAD_PRIORITY", "5");
    assert!(matches!(
        AdmissionConfig::from_env(),
        Err(ConfigError::Invalid(_))
    ));

    set_env("RELIEF_OVERLOAD_PRIORITY", "4");
    set_env("MAX_CONCURRENT", "lots");
    let err = AdmissionConfig::from_env().unwrap_err();
    clear_env();
    assert!(matches!(err, ConfigError::Env { ref name, .. } if name == "TIER_ADMISSION_MAX_CONCURRENT"));
}
