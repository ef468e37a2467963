use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};

/// How `cancel` reacts when one run instance cannot be stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CancelFailurePolicy {
    /// Stop at the first failing instance and return its error.
    #[default]
    AbortOnFirst,
    /// Try every instance, then report all failures together.
    CollectAll,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub cancel_failure_policy: CancelFailurePolicy,
    #[serde(default = "default_true")]
    pub preflight_scheduled_jobs: bool,
    pub stop_timeout_seconds: u64,
}

fn default_true() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cancel_failure_policy: CancelFailurePolicy::AbortOnFirst,
            preflight_scheduled_jobs: true,
            stop_timeout_seconds: 300,
        }
    }
}

impl ConfigValidator for OrchestratorConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_timeout_seconds(
            self.stop_timeout_seconds,
            "orchestrator.stop_timeout_seconds",
        )
    }
}

/// Durable schedule store and the trigger loop that fires its entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub database_url: String,
    pub poll_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://dataflow-schedules.db?mode=rwc".to_string(),
            poll_interval_seconds: 10,
        }
    }
}

impl ConfigValidator for SchedulerConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.database_url, "scheduler.database_url")?;
        if !self.database_url.starts_with("sqlite:") {
            return Err(crate::ConfigError::Validation(format!(
                "scheduler.database_url must be a sqlite URL, got {}",
                self.database_url
            )));
        }
        ValidationUtils::validate_timeout_seconds(
            self.poll_interval_seconds,
            "scheduler.poll_interval_seconds",
        )
    }
}

/// JSON catalog holding projects, clusters, resources, jobs and run instances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("config/catalog.json"),
        }
    }
}

impl ConfigValidator for CatalogConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.path.to_string_lossy(), "catalog.path")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_policy_names() {
        let policy: CancelFailurePolicy = serde_json::from_str("\"collect_all\"").unwrap();
        assert_eq!(policy, CancelFailurePolicy::CollectAll);
        assert_eq!(
            serde_json::to_string(&CancelFailurePolicy::AbortOnFirst).unwrap(),
            "\"abort_on_first\""
        );
    }

    #[test]
    fn test_scheduler_requires_sqlite() {
        let config = SchedulerConfig {
            database_url: "postgres://localhost/db".to_string(),
            poll_interval_seconds: 10,
        };
        assert!(config.validate().is_err());
        assert!(SchedulerConfig::default().validate().is_ok());
    }
}
