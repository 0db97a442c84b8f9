//! Build the admission controller and its consumers from configuration.

use anyhow::Context;

use crate::config::{AdmissionConfig, ConfigError};
use crate::core::{AppResult, SubmitFn, TaskAvailability};
use crate::infra::{BatchHandler, ReliefQueue};

/// Construct a controller and apply every configured bulkhead.
///
/// # Errors
///
/// Invalid configuration, or a bulkhead the controller rejects.
pub fn build_availability(cfg: &AdmissionConfig) -> Result<TaskAvailability, ConfigError> {
    cfg.validate()?;

    let availability = TaskAvailability::new(cfg.levels, cfg.max_concurrent);
    for b in &cfg.bulkheads {
        if !availability.bulkhead_reserve(b.level, b.slots, b.overage) {
            return Err(ConfigError::Invalid(format!(
                "bulkhead for level {} rejected",
                b.level
            )));
        }
    }
    Ok(availability)
}

/// Controller plus an admitted spawner on `handle`, using the configured time budget.
///
/// # Errors
///
/// See [`build_availability`].
#[cfg(feature = "tokio-runtime")]
pub fn build_runtime(
    cfg: &AdmissionConfig,
    handle: tokio::runtime::Handle,
) -> AppResult<(std::sync::Arc<TaskAvailability>, crate::runtime::AdmittedSpawner)> {
    let availability =
        std::sync::Arc::new(build_availability(cfg).context("building task availability")?);
    let spawner = crate::runtime::AdmittedSpawner::new(
        handle,
        std::sync::Arc::clone(&availability),
        std::time::Duration::from_millis(cfg.task_time_budget_ms),
    );
    Ok((availability, spawner))
}

/// Relief queue using the configured queue settings.
///
/// # Errors
///
/// Invalid queue settings or a failed drain-thread spawn.
pub fn build_relief_queue<T: Send + 'static>(
    name: &str,
    cfg: &AdmissionConfig,
    handler: impl BatchHandler<T>,
    submit: SubmitFn,
) -> AppResult<ReliefQueue<T>> {
    ReliefQueue::new(name, cfg.relief.clone(), handler, submit)
        .with_context(|| format!("building relief queue `{name}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BulkheadConfig;

    #[test]
    fn test_bulkheads_applied() {
        let cfg = AdmissionConfig {
            levels: 3,
            max_concurrent: 10,
            bulkheads: vec![BulkheadConfig {
                level: 2,
                slots: 2,
                overage: 1,
            }],
            ..AdmissionConfig::default()
        };
        let ta = build_availability(&cfg).unwrap();
        let state = ta.level_state(2).unwrap();
        assert_eq!(state.bulkhead(), 2);
        assert_eq!(state.overage(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = AdmissionConfig {
            levels: 0,
            ..AdmissionConfig::default()
        };
        assert!(build_availability(&cfg).is_err());
    }
}
