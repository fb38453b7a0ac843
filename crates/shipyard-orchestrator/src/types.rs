use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a task.
///
/// Legal moves: `Pending -> Running -> {Completed | Failed}`, plus
/// `Failed -> Pending` through an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Completed or failed.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Which stage created a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOrigin {
    /// Decomposed from the goal by the planner.
    Planner,
    /// The planner got nothing usable and fell back to the goal text.
    Fallback,
    /// Follow-up work proposed after a batch finished.
    Refiner,
    /// Corrective work proposed after refinement stopped yielding.
    Replanner,
}

/// A status change reported by a worker.
///
/// Exactly one of result and error travels with a finished task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskUpdate {
    Running,
    Completed { result: String },
    Failed { error: String },
}

impl TaskUpdate {
    /// The status this update moves a task into.
    pub fn target_status(&self) -> TaskStatus {
        match self {
            TaskUpdate::Running => TaskStatus::Running,
            TaskUpdate::Completed { .. } => TaskStatus::Completed,
            TaskUpdate::Failed { .. } => TaskStatus::Failed,
        }
    }
}

/// A unit of work in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Imperative description, e.g. "Add a health endpoint".
    pub description: String,
    pub status: TaskStatus,
    /// Captured engine output; only set on `Completed`.
    pub result: Option<String>,
    /// Failure message; only set on `Failed`.
    pub error: Option<String>,
    /// How many times the task was sent back to `Pending` after failing.
    pub retries: u32,
    pub origin: TaskOrigin,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(description: impl Into<String>, origin: TaskOrigin) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
            retries: 0,
            origin,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// First eight characters of the id, for log lines.
    pub fn short_id(&self) -> String {
        self.id.to_string()[..8].to_string()
    }
}

/// Goal-level state shared by every stage of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkState {
    /// The goal text, fixed when the run starts.
    pub goal: String,
    /// Short description of the project, derived once by the planner.
    pub project_context: Option<String>,
    /// Set once by the judge when the run is over.
    pub complete: bool,
}

impl WorkState {
    /// The project context, or an empty string when none was derived.
    pub fn context(&self) -> &str {
        self.project_context.as_deref().unwrap_or_default()
    }
}

/// Per-status task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut counts = TaskCounts {
            total: tasks.len(),
            ..TaskCounts::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = Task::new("Add a health endpoint", TaskOrigin::Planner);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retries, 0);
        assert!(task.result.is_none());
        assert!(task.error.is_none());
        assert_eq!(task.short_id().len(), 8);
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = Task::new("A", TaskOrigin::Planner);
        let b = Task::new("A", TaskOrigin::Planner);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_update_target_status() {
        assert_eq!(TaskUpdate::Running.target_status(), TaskStatus::Running);
        assert_eq!(
            TaskUpdate::Completed { result: "ok".into() }.target_status(),
            TaskStatus::Completed
        );
        assert_eq!(
            TaskUpdate::Failed { error: "boom".into() }.target_status(),
            TaskStatus::Failed
        );
    }

    #[test]
    fn test_status_display_and_terminal() {
        assert_eq!(TaskStatus::Pending.to_string(), "pending");
        assert_eq!(TaskStatus::Failed.to_string(), "failed");
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_counts_from_tasks() {
        let mut running = Task::new("b", TaskOrigin::Planner);
        running.status = TaskStatus::Running;
        let mut failed = Task::new("c", TaskOrigin::Planner);
        failed.status = TaskStatus::Failed;
        let tasks = vec![Task::new("a", TaskOrigin::Planner), running, failed];

        let counts = TaskCounts::from_tasks(&tasks);
        assert_eq!(counts.total, 3);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.completed, 0);
    }

    #[test]
    fn test_task_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        let parsed: TaskStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TaskStatus::Completed);
    }
}
