//! Admission controller and relief queue configuration.

use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "TIER_ADMISSION_";

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// JSON could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// An environment variable held a malformed value.
    #[error("environment variable {name}: {reason}")]
    Env {
        /// Variable name.
        name: String,
        /// What was wrong.
        reason: String,
    },
}

/// Dedicated capacity for one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkheadConfig {
    /// Tier index.
    pub level: usize,
    /// Guaranteed slots.
    pub slots: i64,
    /// Burst allowance for reservation holders.
    #[serde(default)]
    pub overage: i64,
}

/// Overload-relief queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliefQueueConfig {
    /// Maximum queued items before enqueue is rejected.
    pub capacity: usize,
    /// Depth above which the queue asks for extra drain tasks.
    pub overload_threshold: usize,
    /// Ceiling on concurrently running extra drain tasks.
    pub overload_max_tasks: usize,
    /// Items handed to the handler per batch.
    pub drain_batch: usize,
    /// Tier charged for extra drain tasks.
    pub overload_priority: usize,
}

impl Default for ReliefQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            overload_threshold: 1_000,
            overload_max_tasks: 2,
            drain_batch: 100,
            overload_priority: 0,
        }
    }
}

impl ReliefQueueConfig {
    /// Validate queue settings.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("capacity must be greater than 0".into()));
        }
        if self.overload_threshold == 0 || self.overload_threshold >= self.capacity {
            return Err(ConfigError::Invalid(
                "overload_threshold must be in 1..capacity".into(),
            ));
        }
        if self.drain_batch == 0 {
            return Err(ConfigError::Invalid("drain_batch must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Number of priority tiers.
    pub levels: usize,
    /// Global ceiling across non-internal tiers.
    pub max_concurrent: usize,
    /// Bulkheads applied at build time.
    #[serde(default)]
    pub bulkheads: Vec<BulkheadConfig>,
    /// Per-task time budget before the watchdog marks it killed.
    #[serde(default = "default_time_budget_ms")]
    pub task_time_budget_ms: u64,
    /// Relief queue settings.
    #[serde(default)]
    pub relief: ReliefQueueConfig,
}

const fn default_time_budget_ms() -> u64 {
    30_000
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            levels: 3,
            max_concurrent: num_cpus::get() * 4,
            bulkheads: Vec::new(),
            task_time_budget_ms: default_time_budget_ms(),
            relief: ReliefQueueConfig::default(),
        }
    }
}

impl AdmissionConfig {
    /// Validate every field and bulkhead.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.levels == 0 {
            return Err(ConfigError::Invalid("levels must be greater than 0".into()));
        }
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent must be greater than 0".into(),
            ));
        }
        if self.task_time_budget_ms == 0 {
            return Err(ConfigError::Invalid(
                "task_time_budget_ms must be greater than 0".into(),
            ));
        }
        for b in &self.bulkheads {
            if b.level >= self.levels {
                return Err(ConfigError::Invalid(format!(
                    "bulkhead level {} outside 0..{}",
                    b.level, self.levels
                )));
            }
            if b.slots < 0 || b.overage < 0 {
                return Err(ConfigError::Invalid(format!(
                    "bulkhead level {} has negative capacity",
                    b.level
                )));
            }
        }
        if self.relief.overload_priority >= self.levels {
            return Err(ConfigError::Invalid(
                "relief.overload_priority outside configured levels".into(),
            ));
        }
        self.relief
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("relief: {e}")))
    }

    /// Parse from JSON and validate.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(input)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `TIER_ADMISSION_*` variables, after loading `.env`
    /// if one exists.
    ///
    /// Recognized: `LEVELS`, `MAX_CONCURRENT`, `TASK_TIME_BUDGET_MS`,
    /// `RELIEF_CAPACITY`, `RELIEF_OVERLOAD_THRESHOLD`, `RELIEF_OVERLOAD_MAX_TASKS`,
    /// `RELIEF_DRAIN_BATCH`, `RELIEF_OVERLOAD_PRIORITY`.
    ///
    /// # Errors
    ///
    /// Malformed variable or failed validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();
        override_from_env("LEVELS", &mut cfg.levels)?;
        override_from_env("MAX_CONCURRENT", &mut cfg.max_concurrent)?;
        override_from_env("TASK_TIME_BUDGET_MS", &mut cfg.task_time_budget_ms)?;
        override_from_env("RELIEF_CAPACITY", &mut cfg.relief.capacity)?;
        override_from_env("RELIEF_OVERLOAD_THRESHOLD", &mut cfg.relief.overload_threshold)?;
        override_from_env("RELIEF_OVERLOAD_MAX_TASKS", &mut cfg.relief.overload_max_tasks)?;
        override_from_env("RELIEF_DRAIN_BATCH", &mut cfg.relief.drain_batch)?;
        override_from_env("RELIEF_OVERLOAD_PRIORITY", &mut cfg.relief.overload_priority)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

fn override_from_env<T>(suffix: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let name = format!("{ENV_PREFIX}{suffix}");
    if let Ok(raw) = env::var(&name) {
        *target = raw.trim().parse().map_err(|e: T::Err| ConfigError::Env {
            name,
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(AdmissionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_bulkhead_out_of_range() {
        let cfg = AdmissionConfig {
            levels: 2,
            bulkheads: vec![BulkheadConfig {
                level: 2,
                slots: 1,
                overage: 0,
            }],
            ..AdmissionConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_threshold_must_fit_capacity() {
        let relief = ReliefQueueConfig {
            capacity: 10,
            overload_threshold: 10,
            ..ReliefQueueConfig::default()
        };
        assert!(relief.validate().is_err());
    }

    #[test]
    fn test_malformed_env_reported() {
        let mut target = 0usize;
        // Unique suffix so parallel tests don't collide.
        let name = format!("{ENV_PREFIX}TEST_MALFORMED");
        env::set_var(&name, "many");
        let err = override_from_env("TEST_MALFORMED", &mut target).unwrap_err();
        env::remove_var(&name);
        assert!(err.to_string().contains("TEST_MALFORMED"));
    }
}
