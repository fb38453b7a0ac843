use crate::monitor::WorkerMonitor;
use crate::prompts;
use crate::store::TaskStore;
use crate::task_queue::WorkQueue;
use crate::types::{Task, TaskUpdate};
use shipyard_core::{ShipyardError, ShipyardResult};
use shipyard_engine::ExecutionEngine;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Decides whether nominally successful output actually reports that the
/// engine gave up.
///
/// Text matching is a heuristic; swap the implementation when the engine
/// offers a structured signal.
pub trait OutputClassifier: Send + Sync {
    /// `Some(reason)` when the output says the engine ran out of budget.
    fn exhaustion(&self, output: &str) -> Option<String>;
}

/// Looks for the Claude Code "reached max turns" notice.
#[derive(Debug, Clone, Default)]
pub struct MaxTurnsClassifier;

impl OutputClassifier for MaxTurnsClassifier {
    fn exhaustion(&self, output: &str) -> Option<String> {
        output
            .to_lowercase()
            .contains("reached max turns")
            .then(|| "reached max turns".to_string())
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// One member of the worker pool.
///
/// Pulls task ids off the queue one at a time, runs them through the engine
/// and records the outcome. A failing task never ends the loop; only
/// cancellation does.
pub struct Worker {
    id: String,
    store: Arc<TaskStore>,
    engine: Arc<dyn ExecutionEngine>,
    classifier: Arc<dyn OutputClassifier>,
    monitor: Arc<WorkerMonitor>,
    completions: mpsc::UnboundedSender<Task>,
    timeout: Duration,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        store: Arc<TaskStore>,
        engine: Arc<dyn ExecutionEngine>,
        monitor: Arc<WorkerMonitor>,
        completions: mpsc::UnboundedSender<Task>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            store,
            engine,
            classifier: Arc::new(MaxTurnsClassifier),
            monitor,
            completions,
            timeout,
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn OutputClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Process tasks until cancelled. Always ends with an error; a clean
    /// shutdown ends with [`ShipyardError::Cancelled`].
    pub async fn run(self, queue: WorkQueue, cancel: CancellationToken) -> ShipyardResult<()> {
        info!(worker = %self.id, "worker starting");
        self.monitor.register(&self.id).await;

        loop {
            let task_id = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(worker = %self.id, "worker stopping");
                    return Err(ShipyardError::Cancelled);
                }
                next = queue.pop() => match next {
                    Some(id) => id,
                    None => return Err(ShipyardError::Orchestrator("work queue closed".into())),
                },
            };
            self.process(task_id, &cancel).await?;
        }
    }

    async fn process(&self, task_id: Uuid, cancel: &CancellationToken) -> ShipyardResult<()> {
        let task = match self.store.update_task(task_id, TaskUpdate::Running).await {
            Ok(task) => task,
            Err(e) => {
                warn!(worker = %self.id, task_id = %task_id, error = %e, "cannot start task, skipping");
                return Ok(());
            }
        };

        info!(worker = %self.id, task_id = %task_id, description = %task.description, "task started");
        self.monitor
            .start_task(&self.id, task_id, &task.description)
            .await;
        let start = Instant::now();

        let work = self.store.get_work_state().await;
        let prompt = prompts::task_prompt(work.context(), &task.description, self.timeout);

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                // The task stays Running; the run report counts it as interrupted.
                info!(worker = %self.id, task_id = %task_id, "cancelled mid-task");
                self.monitor
                    .finish_task(&self.id, false, start.elapsed().as_millis() as u64)
                    .await;
                return Err(ShipyardError::Cancelled);
            }
            outcome = self.execute(prompt) => outcome,
        };

        let update = self.classify(&task, outcome);
        let succeeded = matches!(update, TaskUpdate::Completed { .. });

        match self.store.update_task(task_id, update).await {
            Ok(updated) => {
                if succeeded {
                    // The judge may already be gone at shutdown.
                    let _ = self.completions.send(updated);
                }
            }
            Err(e) => {
                error!(worker = %self.id, task_id = %task_id, error = %e, "failed to record task outcome");
            }
        }

        self.monitor
            .finish_task(&self.id, succeeded, start.elapsed().as_millis() as u64)
            .await;
        Ok(())
    }

    /// Run the engine on a separate tokio task so a panic inside it turns
    /// into a failed task instead of taking the worker down.
    async fn execute(&self, prompt: String) -> ShipyardResult<String> {
        let engine = self.engine.clone();
        let worker = self.id.clone();
        let timeout = self.timeout;

        let call = tokio::spawn(async move {
            let (mut lines, handle) = engine.execute_stream(&prompt, timeout).await?;
            let mut handle = AbortOnDrop(handle);
            while let Some(line) = lines.recv().await {
                if !line.trim().is_empty() {
                    debug!(worker = %worker, "{line}");
                }
            }
            match (&mut handle.0).await {
                Ok(result) => result,
                Err(e) => Err(ShipyardError::Engine(format!("engine task failed: {e}"))),
            }
        });
        let mut call = AbortOnDrop(call);

        match tokio::time::timeout(timeout, &mut call.0).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ShipyardError::Engine(format!("unexpected failure: {e}"))),
            Err(_) => Err(ShipyardError::Timeout(timeout)),
        }
    }

    fn classify(&self, task: &Task, outcome: ShipyardResult<String>) -> TaskUpdate {
        match outcome {
            Ok(output) => match self.classifier.exhaustion(&output) {
                Some(reason) => {
                    warn!(worker = %self.id, task_id = %task.id, reason = %reason, "engine gave up, task incomplete");
                    TaskUpdate::Failed { error: reason }
                }
                None => {
                    info!(worker = %self.id, task_id = %task.id, "task completed");
                    TaskUpdate::Completed { result: output }
                }
            },
            Err(e) if e.is_timeout() => {
                warn!(worker = %self.id, task_id = %task.id, error = %e, "task timed out");
                TaskUpdate::Failed {
                    error: e.to_string(),
                }
            }
            Err(e) => {
                error!(worker = %self.id, task_id = %task.id, error = %e, "task failed");
                TaskUpdate::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskOrigin, TaskStatus};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Succeed(&'static str),
        Fail,
        Hang,
        Panic,
    }

    struct StubEngine {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl StubEngine {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ExecutionEngine for StubEngine {
        async fn execute(&self, prompt: &str, _timeout: Duration) -> ShipyardResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(prompt.starts_with(prompts::TASK_HEADER));
            match self.behaviour {
                Behaviour::Succeed(text) => Ok(text.to_string()),
                Behaviour::Fail => Err(ShipyardError::Engine("exit 2".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
                Behaviour::Panic => panic!("engine blew up"),
            }
        }
    }

    struct Harness {
        store: Arc<TaskStore>,
        queue: WorkQueue,
        cancel: CancellationToken,
        completions: mpsc::UnboundedReceiver<Task>,
        monitor: Arc<WorkerMonitor>,
        handle: JoinHandle<ShipyardResult<()>>,
    }

    async fn start(engine: Arc<dyn ExecutionEngine>, timeout: Duration) -> Harness {
        let store = Arc::new(TaskStore::new("goal", 10));
        let queue = WorkQueue::new();
        let cancel = CancellationToken::new();
        let monitor = Arc::new(WorkerMonitor::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker::new("worker-0", store.clone(), engine, monitor.clone(), tx, timeout);
        let handle = tokio::spawn(worker.run(queue.clone(), cancel.clone()));
        Harness {
            store,
            queue,
            cancel,
            completions: rx,
            monitor,
            handle,
        }
    }

    async fn submit(h: &Harness, description: &str) -> Uuid {
        let id = h
            .store
            .add_task(Task::new(description, TaskOrigin::Planner))
            .await
            .unwrap();
        h.queue.push(id).unwrap();
        id
    }

    async fn wait_terminal(store: &TaskStore, id: Uuid) -> Task {
        for _ in 0..500 {
            let task = store.get_task(id).await.unwrap();
            if task.status.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {id} never finished");
    }

    #[test]
    fn test_max_turns_classifier() {
        let c = MaxTurnsClassifier;
        assert!(c.exhaustion("all good").is_none());
        assert_eq!(
            c.exhaustion("Error: Reached max turns (20)").as_deref(),
            Some("reached max turns")
        );
    }

    #[tokio::test]
    async fn test_success_completes_and_notifies() {
        let engine = StubEngine::new(Behaviour::Succeed("wrote src/health.rs"));
        let mut h = start(engine.clone(), Duration::from_secs(5)).await;
        let id = submit(&h, "Add a health endpoint").await;

        let task = wait_terminal(&h.store, id).await;
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result.as_deref(), Some("wrote src/health.rs"));
        assert!(task.error.is_none());

        let notified = h.completions.recv().await.unwrap();
        assert_eq!(notified.id, id);

        h.cancel.cancel();
        assert!(h.handle.await.unwrap().unwrap_err().is_cancelled());
        let state = h.monitor.get_state("worker-0").await.unwrap();
        assert_eq!(state.metrics.tasks_completed, 1);
    }

    #[tokio::test]
    async fn test_exhausted_output_fails() {
        let engine = StubEngine::new(Behaviour::Succeed("partial\nError: Reached max turns (20)"));
        let h = start(engine, Duration::from_secs(5)).await;
        let id = submit(&h, "Write a large module").await;

        let task = wait_terminal(&h.store, id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("reached max turns"));
        assert!(task.result.is_none());
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn test_engine_error_fails_and_loop_continues() {
        let engine = StubEngine::new(Behaviour::Fail);
        let h = start(engine.clone(), Duration::from_secs(5)).await;
        let first = submit(&h, "First failing task").await;
        let second = submit(&h, "Second failing task").await;

        let a = wait_terminal(&h.store, first).await;
        let b = wait_terminal(&h.store, second).await;
        assert_eq!(a.status, TaskStatus::Failed);
        assert!(a.error.unwrap().contains("exit 2"));
        assert_eq!(b.status, TaskStatus::Failed);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
        assert!(!h.handle.is_finished());
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn test_timeout_fails_with_timeout_error() {
        let engine = StubEngine::new(Behaviour::Hang);
        let h = start(engine, Duration::from_millis(50)).await;
        let id = submit(&h, "Task that hangs forever").await;

        let task = wait_terminal(&h.store, id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.unwrap().starts_with("timeout"));
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn test_panic_is_recorded_as_failure() {
        let engine = StubEngine::new(Behaviour::Panic);
        let h = start(engine, Duration::from_secs(5)).await;
        let id = submit(&h, "Task that panics").await;
        let ok = submit(&h, "Next task still runs").await;

        let task = wait_terminal(&h.store, id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.unwrap().contains("unexpected failure"));
        // The worker survived and took the next task.
        assert_eq!(wait_terminal(&h.store, ok).await.status, TaskStatus::Failed);
        h.cancel.cancel();
    }

    #[tokio::test]
    async fn test_cancel_mid_task_leaves_task_running() {
        let engine = StubEngine::new(Behaviour::Hang);
        let h = start(engine, Duration::from_secs(3600)).await;
        let id = submit(&h, "Long running task").await;

        for _ in 0..200 {
            if h.store.get_task(id).await.unwrap().status == TaskStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        h.cancel.cancel();
        let err = h.handle.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(h.store.get_task(id).await.unwrap().status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn test_stale_queue_entry_is_skipped() {
        let engine = StubEngine::new(Behaviour::Succeed("ok"));
        let h = start(engine.clone(), Duration::from_secs(5)).await;
        h.queue.push(Uuid::new_v4()).unwrap();
        let id = submit(&h, "Real task after stale id").await;

        assert_eq!(wait_terminal(&h.store, id).await.status, TaskStatus::Completed);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        h.cancel.cancel();
    }
}
