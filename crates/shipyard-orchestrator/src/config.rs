use crate::store::DEFAULT_MAX_RETRIES;
use serde::{Deserialize, Serialize};
use shipyard_core::{ShipyardError, ShipyardResult};
use std::path::PathBuf;
use std::time::Duration;

/// Tuning for one run: pool size, time budgets and escalation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Size of the worker pool.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// Budget for a single task execution.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// Budget for planning, refinement, replanning and validation calls.
    #[serde(default = "default_planning_timeout_secs")]
    pub planning_timeout_secs: u64,
    /// Budget for a per-task review call.
    #[serde(default = "default_review_timeout_secs")]
    pub review_timeout_secs: u64,
    /// How often the judge looks at the registry.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Retry ceiling per task.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Refinement rounds allowed per run.
    #[serde(default = "default_max_refine_rounds")]
    pub max_refine_rounds: u32,
    /// Replanning rounds allowed per run.
    #[serde(default = "default_max_replan_rounds")]
    pub max_replan_rounds: u32,
    /// Completed tasks quoted to the refiner and replanner (most recent).
    #[serde(default = "default_history_completed")]
    pub history_completed: usize,
    /// Failed tasks quoted to the refiner and replanner (most recent).
    #[serde(default = "default_history_failed")]
    pub history_failed: usize,
    /// Ask the engine to review each completed task.
    #[serde(default)]
    pub review_completed: bool,
    /// Markdown progress file rewritten on every judge tick.
    #[serde(default)]
    pub progress_file: Option<PathBuf>,
}

fn default_num_workers() -> usize {
    4
}
fn default_task_timeout_secs() -> u64 {
    600
}
fn default_planning_timeout_secs() -> u64 {
    60
}
fn default_review_timeout_secs() -> u64 {
    45
}
fn default_poll_interval_ms() -> u64 {
    5_000
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_max_refine_rounds() -> u32 {
    10
}
fn default_max_replan_rounds() -> u32 {
    1
}
fn default_history_completed() -> usize {
    10
}
fn default_history_failed() -> usize {
    5
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            task_timeout_secs: default_task_timeout_secs(),
            planning_timeout_secs: default_planning_timeout_secs(),
            review_timeout_secs: default_review_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_retries: default_max_retries(),
            max_refine_rounds: default_max_refine_rounds(),
            max_replan_rounds: default_max_replan_rounds(),
            history_completed: default_history_completed(),
            history_failed: default_history_failed(),
            review_completed: false,
            progress_file: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn planning_timeout(&self) -> Duration {
        Duration::from_secs(self.planning_timeout_secs)
    }

    pub fn review_timeout(&self) -> Duration {
        Duration::from_secs(self.review_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject settings a run cannot make progress with.
    pub fn validate(&self) -> ShipyardResult<()> {
        if self.num_workers == 0 {
            return Err(ShipyardError::Config("num_workers must be at least 1".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ShipyardError::Config("poll_interval_ms must be positive".into()));
        }
        if self.task_timeout_secs == 0 || self.planning_timeout_secs == 0 {
            return Err(ShipyardError::Config("timeouts must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.max_refine_rounds, 10);
        assert_eq!(config.max_replan_rounds, 1);
        assert_eq!(config.task_timeout(), Duration::from_secs(600));
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: OrchestratorConfig = toml::from_str("").unwrap();
        assert_eq!(config.history_completed, 10);
        assert_eq!(config.history_failed, 5);
        assert!(!config.review_completed);
        assert!(config.progress_file.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config: OrchestratorConfig = toml::from_str(
            r#"
            num_workers = 8
            max_replan_rounds = 2
            progress_file = "PROGRESS.md"
            "#,
        )
        .unwrap();
        assert_eq!(config.num_workers, 8);
        assert_eq!(config.max_replan_rounds, 2);
        assert_eq!(config.progress_file, Some(PathBuf::from("PROGRESS.md")));
        assert_eq!(config.max_refine_rounds, 10);
    }

    #[test]
    fn test_validate_rejects_empty_pool() {
        let config = OrchestratorConfig {
            num_workers: 0,
            ..OrchestratorConfig::default()
        };
        assert!(matches!(config.validate(), Err(ShipyardError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_poll() {
        let config = OrchestratorConfig {
            poll_interval_ms: 0,
            ..OrchestratorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
