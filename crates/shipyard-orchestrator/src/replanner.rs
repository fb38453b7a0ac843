use crate::extract::{TagExtractor, TaskExtractor};
use crate::planner::insert_tasks;
use crate::prompts;
use crate::refiner::HistoryWindow;
use crate::store::TaskStore;
use crate::types::{Task, TaskOrigin};
use shipyard_engine::ExecutionEngine;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Compares the original goal with what got built and proposes tasks for the
/// gap. Used after refinement stops producing work.
pub struct Replanner {
    store: Arc<TaskStore>,
    engine: Arc<dyn ExecutionEngine>,
    extractor: Arc<dyn TaskExtractor>,
    timeout: Duration,
    history: HistoryWindow,
}

impl Replanner {
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

    /// Ask for gap-closing tasks; the ones returned are already in the store.
    pub async fn replan(&self) -> Vec<Task> {
        let tasks = self.store.get_all_tasks().await;
        let (completed, failed) = self.history.select(&tasks);
        let work = self.store.get_work_state().await;
        let prompt = prompts::replan_prompt(work.context(), &work.goal, &completed, &failed);

        info!(completed = completed.len(), failed = failed.len(), "replanning against the goal");
        match self.engine.execute(&prompt, self.timeout).await {
            Ok(text) => {
                let descriptions = self.extractor.extract_tasks(&text);
                let added = insert_tasks(&self.store, descriptions, TaskOrigin::Replanner).await;
                info!(count = added.len(), "replanner finished");
                added
            }
            Err(e) => {
                warn!(error = %e, "replanner failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskUpdate;
    use async_trait::async_trait;
    use shipyard_core::{ShipyardError, ShipyardResult};
    use std::sync::Mutex;

    struct Recorder {
        reply: ShipyardResult<&'static str>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ExecutionEngine for Recorder {
        async fn execute(&self, prompt: &str, _timeout: Duration) -> ShipyardResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.to_string()),
                Err(_) => Err(ShipyardError::Engine("exit status 1".into())),
            }
        }
    }

    fn recorder(reply: ShipyardResult<&'static str>) -> Arc<Recorder> {
        Arc::new(Recorder {
            reply,
            prompts: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_gap_tasks_added_with_goal_in_prompt() {
        let store = Arc::new(TaskStore::new("Build a todo API with auth", 10));
        let id = store
            .add_task(Task::new("Create todo handlers", TaskOrigin::Planner))
            .await
            .unwrap();
        store.update_task(id, TaskUpdate::Running).await.unwrap();
        store
            .update_task(id, TaskUpdate::Completed { result: "ok".into() })
            .await
            .unwrap();

        let engine = recorder(Ok("<tasks><task>Implement token authentication</task></tasks>"));
        let replanner = Replanner::new(store.clone(), engine.clone(), Duration::from_secs(60));
        let added = replanner.replan().await;

        assert_eq!(added.len(), 1);
        assert_eq!(added[0].origin, TaskOrigin::Replanner);
        assert_eq!(store.counts().await.pending, 1);

        let prompt = engine.prompts.lock().unwrap()[0].clone();
        assert!(prompt.starts_with(prompts::REPLAN_HEADER));
        assert!(prompt.contains("Build a todo API with auth"));
        assert!(prompt.contains("[DONE] Create todo handlers"));
    }

    #[tokio::test]
    async fn test_goal_met_yields_nothing() {
        let store = Arc::new(TaskStore::new("goal", 10));
        let replanner = Replanner::new(store.clone(), recorder(Ok("<tasks></tasks>")), Duration::from_secs(60));
        assert!(replanner.replan().await.is_empty());
        assert!(store.get_all_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_yields_nothing() {
        let store = Arc::new(TaskStore::new("goal", 10));
        let replanner = Replanner::new(
            store,
            recorder(Err(ShipyardError::Engine("down".into()))),
            Duration::from_secs(60),
        );
        assert!(replanner.replan().await.is_empty());
    }
}
