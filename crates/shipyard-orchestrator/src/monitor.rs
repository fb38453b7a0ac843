use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Working,
}

/// Counters accumulated per worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub busy_ms: u64,
}

/// Real-time snapshot of one worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerState {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub current_task: Option<Uuid>,
    pub current_description: Option<String>,
    pub metrics: WorkerMetrics,
}

impl WorkerState {
    fn idle(worker_id: &str) -> Self {
        Self {
            worker_id: worker_id.to_string(),
            status: WorkerStatus::Idle,
            current_task: None,
            current_description: None,
            metrics: WorkerMetrics::default(),
        }
    }
}

/// Tracks what every worker in the pool is doing.
///
/// Purely observational: nothing in scheduling reads it back.
pub struct WorkerMonitor {
    states: RwLock<HashMap<String, WorkerState>>,
}

impl WorkerMonitor {
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Add an idle worker.
    pub async fn register(&self, worker_id: &str) {
        let mut states = self.states.write().await;
        states
            .entry(worker_id.to_string())
            .or_insert_with(|| WorkerState::idle(worker_id));
    }

    /// Mark a worker as busy with a task.
    pub async fn start_task(&self, worker_id: &str, task_id: Uuid, description: &str) {
        let mut states = self.states.write().await;
        let state = states
            .entry(worker_id.to_string())
            .or_insert_with(|| WorkerState::idle(worker_id));
        state.status = WorkerStatus::Working;
        state.current_task = Some(task_id);
        state.current_description = Some(description.to_string());
    }

    /// Mark a worker idle again and record how its task went.
    pub async fn finish_task(&self, worker_id: &str, succeeded: bool, duration_ms: u64) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(worker_id) {
            state.status = WorkerStatus::Idle;
            state.current_task = None;
            state.current_description = None;
            state.metrics.busy_ms += duration_ms;
            if succeeded {
                state.metrics.tasks_completed += 1;
            } else {
                state.metrics.tasks_failed += 1;
            }
        }
    }

    /// All workers, sorted by id.
    pub async fn snapshot(&self) -> Vec<WorkerState> {
        let states = self.states.read().await;
        let mut all: Vec<WorkerState> = states.values().cloned().collect();
        all.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        all
    }

    pub async fn get_state(&self, worker_id: &str) -> Option<WorkerState> {
        self.states.read().await.get(worker_id).cloned()
    }

    /// `(worker id, task description)` for every busy worker, sorted by id.
    pub async fn current_tasks(&self) -> Vec<(String, String)> {
        self.snapshot()
            .await
            .into_iter()
            .filter_map(|s| s.current_description.map(|d| (s.worker_id, d)))
            .collect()
    }

    /// Totals across the pool.
    pub async fn aggregate_metrics(&self) -> WorkerMetrics {
        let states = self.states.read().await;
        let mut total = WorkerMetrics::default();
        for state in states.values() {
            total.tasks_completed += state.metrics.tasks_completed;
            total.tasks_failed += state.metrics.tasks_failed;
            total.busy_ms += state.metrics.busy_ms;
        }
        total
    }
}

impl Default for WorkerMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_is_idle() {
        let monitor = WorkerMonitor::new();
        monitor.register("worker-1").await;
        monitor.register("worker-0").await;
        let states = monitor.snapshot().await;
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].worker_id, "worker-0");
        for state in &states {
            assert_eq!(state.status, WorkerStatus::Idle);
            assert!(state.current_task.is_none());
        }
    }

    #[tokio::test]
    async fn test_start_and_finish_task() {
        let monitor = WorkerMonitor::new();
        let task_id = Uuid::new_v4();
        monitor.register("worker-0").await;

        monitor.start_task("worker-0", task_id, "Add endpoint").await;
        let state = monitor.get_state("worker-0").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Working);
        assert_eq!(state.current_task, Some(task_id));
        assert_eq!(
            monitor.current_tasks().await,
            vec![("worker-0".to_string(), "Add endpoint".to_string())]
        );

        monitor.finish_task("worker-0", true, 120).await;
        let state = monitor.get_state("worker-0").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Idle);
        assert!(state.current_task.is_none());
        assert_eq!(state.metrics.tasks_completed, 1);
        assert_eq!(state.metrics.busy_ms, 120);
        assert!(monitor.current_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_metrics() {
        let monitor = WorkerMonitor::new();
        for (worker, ok) in [("w0", true), ("w1", false), ("w1", true)] {
            monitor.start_task(worker, Uuid::new_v4(), "t").await;
            monitor.finish_task(worker, ok, 10).await;
        }
        let agg = monitor.aggregate_metrics().await;
        assert_eq!(agg.tasks_completed, 2);
        assert_eq!(agg.tasks_failed, 1);
        assert_eq!(agg.busy_ms, 30);
    }
}
