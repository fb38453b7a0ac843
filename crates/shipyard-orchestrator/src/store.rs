use crate::types::{Task, TaskCounts, TaskStatus, TaskUpdate, WorkState};
use chrono::Utc;
use shipyard_core::{ShipyardError, ShipyardResult};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Retry ceiling used when none is configured.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

struct Registry {
    tasks: HashMap<Uuid, Task>,
    order: Vec<Uuid>,
    work: WorkState,
}

/// The task registry and goal state for one run.
///
/// Every operation takes the registry lock for its whole duration, so no
/// reader ever observes a task halfway through a transition. Reads hand out
/// clones; nothing outside the store holds a reference into it.
pub struct TaskStore {
    inner: RwLock<Registry>,
    max_retries: u32,
}

impl TaskStore {
    /// Create the store for a run with the given goal and retry ceiling.
    pub fn new(goal: impl Into<String>, max_retries: u32) -> Self {
        Self {
            inner: RwLock::new(Registry {
                tasks: HashMap::new(),
                order: Vec::new(),
                work: WorkState {
                    goal: goal.into(),
                    project_context: None,
                    complete: false,
                },
            }),
            max_retries,
        }
    }

    /// The retry ceiling.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Insert a new task at `Pending`. Fails on a duplicate id.
    pub async fn add_task(&self, mut task: Task) -> ShipyardResult<Uuid> {
        let mut reg = self.inner.write().await;
        ensure_open(&reg)?;
        if reg.tasks.contains_key(&task.id) {
            return Err(ShipyardError::Store(format!("task {} already exists", task.id)));
        }

        task.status = TaskStatus::Pending;
        task.result = None;
        task.error = None;
        task.finished_at = None;

        let id = task.id;
        reg.order.push(id);
        reg.tasks.insert(id, task);
        Ok(id)
    }

    /// Apply a worker's status change and return the updated task.
    pub async fn update_task(&self, id: Uuid, update: TaskUpdate) -> ShipyardResult<Task> {
        let mut reg = self.inner.write().await;
        ensure_open(&reg)?;
        let task = reg
            .tasks
            .get_mut(&id)
            .ok_or_else(|| ShipyardError::Store(format!("unknown task {id}")))?;

        let to = update.target_status();
        let legal = matches!(
            (task.status, to),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
        );
        if !legal {
            return Err(ShipyardError::InvalidTransition {
                task_id: id.to_string(),
                from: task.status.to_string(),
                to: to.to_string(),
            });
        }

        task.status = to;
        match update {
            TaskUpdate::Running => {}
            TaskUpdate::Completed { result } => {
                task.result = Some(result);
                task.error = None;
                task.finished_at = Some(Utc::now());
            }
            TaskUpdate::Failed { error } => {
                task.error = Some(error);
                task.result = None;
                task.finished_at = Some(Utc::now());
            }
        }
        Ok(task.clone())
    }

    /// Send a failed task back to `Pending` and bump its retry count.
    ///
    /// Returns `Ok(false)` without touching the task when it is not failed or
    /// has already reached the ceiling.
    pub async fn retry_task(&self, id: Uuid) -> ShipyardResult<bool> {
        let mut reg = self.inner.write().await;
        ensure_open(&reg)?;
        let task = reg
            .tasks
            .get_mut(&id)
            .ok_or_else(|| ShipyardError::Store(format!("unknown task {id}")))?;

        if task.status != TaskStatus::Failed || task.retries >= self.max_retries {
            return Ok(false);
        }
        task.retries += 1;
        task.status = TaskStatus::Pending;
        task.error = None;
        task.finished_at = None;
        Ok(true)
    }

    pub async fn get_task(&self, id: Uuid) -> Option<Task> {
        self.inner.read().await.tasks.get(&id).cloned()
    }

    /// Snapshot of every task in insertion order.
    pub async fn get_all_tasks(&self) -> Vec<Task> {
        let reg = self.inner.read().await;
        reg.order
            .iter()
            .filter_map(|id| reg.tasks.get(id).cloned())
            .collect()
    }

    pub async fn counts(&self) -> TaskCounts {
        let tasks = self.get_all_tasks().await;
        TaskCounts::from_tasks(&tasks)
    }

    /// Nothing pending or running, and every failure is out of retries.
    pub async fn is_complete(&self) -> bool {
        let reg = self.inner.read().await;
        reg.tasks.values().all(|t| match t.status {
            TaskStatus::Pending | TaskStatus::Running => false,
            TaskStatus::Completed => true,
            TaskStatus::Failed => t.retries >= self.max_retries,
        })
    }

    /// Close the run. Returns `true` only for the call that closed it.
    pub async fn mark_complete(&self) -> bool {
        let mut reg = self.inner.write().await;
        if reg.work.complete {
            return false;
        }
        reg.work.complete = true;
        true
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.read().await.work.complete
    }

    pub async fn get_work_state(&self) -> WorkState {
        self.inner.read().await.work.clone()
    }

    /// Record the project context. It can be set once.
    pub async fn set_project_context(&self, context: impl Into<String>) -> ShipyardResult<()> {
        let mut reg = self.inner.write().await;
        ensure_open(&reg)?;
        if reg.work.project_context.is_some() {
            return Err(ShipyardError::Store("project context already set".into()));
        }
        reg.work.project_context = Some(context.into());
        Ok(())
    }
}

fn ensure_open(reg: &Registry) -> ShipyardResult<()> {
    if reg.work.complete {
        return Err(ShipyardError::Store("run already complete".into()));
    }
    Ok(())
}
