use crate::extract::{extract_list_items, TagExtractor, TaskExtractor};
use crate::prompts;
use crate::store::TaskStore;
use crate::types::{Task, TaskOrigin};
use shipyard_core::{ShipyardError, ShipyardResult};
use shipyard_engine::ExecutionEngine;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Insert one task per description and return the ones the store accepted.
pub(crate) async fn insert_tasks(
    store: &TaskStore,
    descriptions: Vec<String>,
    origin: TaskOrigin,
) -> Vec<Task> {
    let mut added = Vec::with_capacity(descriptions.len());
    for description in descriptions {
        let task = Task::new(description, origin);
        match store.add_task(task.clone()).await {
            Ok(_) => {
                info!(task_id = %task.id, origin = ?origin, description = %task.description, "task created");
                added.push(task);
            }
            Err(e) => warn!(origin = ?origin, error = %e, "could not add task"),
        }
    }
    added
}

/// Splits the goal into the initial batch of tasks. Runs once per run.
pub struct Planner {
    store: Arc<TaskStore>,
    engine: Arc<dyn ExecutionEngine>,
    extractor: Arc<dyn TaskExtractor>,
    timeout: Duration,
}

impl Planner {
    pub fn new(store: Arc<TaskStore>, engine: Arc<dyn ExecutionEngine>, timeout: Duration) -> Self {
        Self {
            store,
            engine,
            extractor: Arc::new(TagExtractor),
            timeout,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TaskExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Decompose the goal, record the project context and add the tasks.
    ///
    /// A non-empty goal always yields at least one task: when the engine gives
    /// nothing usable, list items in the goal become the tasks, and failing
    /// that the whole goal becomes one task.
    pub async fn plan_once(&self) -> ShipyardResult<Vec<Task>> {
        let work = self.store.get_work_state().await;
        let goal = work.goal.trim();
        if goal.is_empty() {
            return Err(ShipyardError::Config("goal is empty".into()));
        }

        info!(goal_len = goal.len(), "breaking down goal into tasks");
        let (context, descriptions) = self.decompose(goal).await;

        if let Some(context) = context {
            match self.store.set_project_context(context.clone()).await {
                Ok(()) => info!(context = %context, "project context set"),
                Err(e) => warn!(error = %e, "project context not recorded"),
            }
        }

        let (descriptions, origin) = if !descriptions.is_empty() {
            (descriptions, TaskOrigin::Planner)
        } else {
            let items = extract_list_items(goal);
            if items.is_empty() {
                warn!("no tasks extracted, using the whole goal as one task");
                (vec![goal.to_string()], TaskOrigin::Fallback)
            } else {
                warn!(count = items.len(), "no tasks extracted, using list items from the goal");
                (items, TaskOrigin::Fallback)
            }
        };

        let tasks = insert_tasks(&self.store, descriptions, origin).await;
        if tasks.is_empty() {
            return Err(ShipyardError::Orchestrator(
                "planner could not add any task".into(),
            ));
        }
        info!(count = tasks.len(), "plan ready");
        Ok(tasks)
    }

    async fn decompose(&self, goal: &str) -> (Option<String>, Vec<String>) {
        let prompt = prompts::plan_prompt(goal);
        match self.engine.execute(&prompt, self.timeout).await {
            Ok(text) => (
                self.extractor.extract_context(&text),
                self.extractor.extract_tasks(&text),
            ),
            Err(e) => {
                warn!(error = %e, "planning call failed");
                (None, Vec::new())
            }
        }
    }
}
