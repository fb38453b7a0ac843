use crate::extract::{TagExtractor, TaskExtractor};
use crate::planner::insert_tasks;
use crate::prompts;
use crate::store::TaskStore;
use crate::types::{Task, TaskOrigin, TaskStatus};
use shipyard_engine::ExecutionEngine;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// How much task history is quoted back to the engine.
#[derive(Debug, Clone, Copy)]
pub struct HistoryWindow {
    /// Most recent completed tasks to include.
    pub completed: usize,
    /// Most recent failed tasks to include.
    pub failed: usize,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self {
            completed: 10,
            failed: 5,
        }
    }
}

impl HistoryWindow {
    /// The most recent completed and failed tasks, oldest first.
    pub fn select(&self, tasks: &[Task]) -> (Vec<Task>, Vec<Task>) {
        (
            tail_with_status(tasks, TaskStatus::Completed, self.completed),
            tail_with_status(tasks, TaskStatus::Failed, self.failed),
        )
    }
}

fn tail_with_status(tasks: &[Task], status: TaskStatus, n: usize) -> Vec<Task> {
    let matching: Vec<&Task> = tasks.iter().filter(|t| t.status == status).collect();
    let skip = matching.len().saturating_sub(n);
    matching.into_iter().skip(skip).cloned().collect()
}

/// Proposes follow-up work once a batch has finished.
///
/// Sees only recent outcomes. An engine failure means no new tasks.
pub struct Refiner {
    store: Arc<TaskStore>,
    engine: Arc<dyn ExecutionEngine>,
    extractor: Arc<dyn TaskExtractor>,
    timeout: Duration,
    history: HistoryWindow,
}

impl Refiner {
    pub fn new(store: Arc<TaskStore>, engine: Arc<dyn ExecutionEngine>, timeout: Duration) -> Self {
        Self {
            store,
            engine,
            extractor: Arc::new(TagExtractor),
            timeout,
            history: HistoryWindow::default(),
        }
    }

    pub fn with_history(mut self, history: HistoryWindow) -> Self {
        self.history = history;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TaskExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Ask for follow-up tasks; the ones returned are already in the store.
    pub async fn refine(&self) -> Vec<Task> {
        let tasks = self.store.get_all_tasks().await;
        let (completed, failed) = self.history.select(&tasks);
        if completed.is_empty() && failed.is_empty() {
            return Vec::new();
        }

        let work = self.store.get_work_state().await;
        let prompt = prompts::refine_prompt(work.context(), &completed, &failed);

        match self.engine.execute(&prompt, self.timeout).await {
            Ok(text) => {
                let descriptions = self.extractor.extract_tasks(&text);
                let added = insert_tasks(&self.store, descriptions, TaskOrigin::Refiner).await;
                info!(count = added.len(), "refiner finished");
                added
            }
            Err(e) => {
                warn!(error = %e, "refiner failed");
                Vec::new()
            }
        }
    }
}
