use crate::config::OrchestratorConfig;
use crate::extract::{TagExtractor, TaskExtractor};
use crate::judge::{Judge, JudgeReport};
use crate::monitor::{WorkerMetrics, WorkerMonitor};
use crate::planner::Planner;
use crate::progress::{LogProgress, MultiProgress, ProgressFile, ProgressSink};
use crate::store::TaskStore;
use crate::task_queue::WorkQueue;
use crate::types::{Task, TaskCounts};
use crate::worker::{MaxTurnsClassifier, OutputClassifier, Worker};
use serde::{Deserialize, Serialize};
use shipyard_core::{ShipyardError, ShipyardResult};
use shipyard_engine::ExecutionEngine;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Drives one goal from planning to completion.
///
/// Plan once, then run the worker pool and the judge side by side until the
/// judge decides the goal is satisfied or the token is cancelled.
pub struct Orchestrator {
    config: OrchestratorConfig,
    engine: Arc<dyn ExecutionEngine>,
    extractor: Arc<dyn TaskExtractor>,
    classifier: Arc<dyn OutputClassifier>,
    progress: Arc<dyn ProgressSink>,
    monitor: Arc<WorkerMonitor>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, engine: Arc<dyn ExecutionEngine>) -> Self {
        let progress: Arc<dyn ProgressSink> = match &config.progress_file {
            Some(path) => Arc::new(MultiProgress::new(vec![
                Box::new(LogProgress),
                Box::new(ProgressFile::new(path.clone())),
            ])),
            None => Arc::new(LogProgress),
        };

        Self {
            config,
            engine,
            extractor: Arc::new(TagExtractor),
            classifier: Arc::new(MaxTurnsClassifier),
            progress,
            monitor: Arc::new(WorkerMonitor::new()),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TaskExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn OutputClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<WorkerMonitor> {
        &self.monitor
    }

    /// Run the goal to completion.
    ///
    /// Cancelling the token stops every worker and the judge; the call then
    /// returns [`ShipyardError::Cancelled`] after logging a partial report.
    pub async fn run(&self, goal: &str, cancel: CancellationToken) -> ShipyardResult<RunReport> {
        self.config.validate()?;
        let start = Instant::now();
        let store = Arc::new(TaskStore::new(goal, self.config.max_retries));

        info!(workers = self.config.num_workers, "starting run");

        let planner = Planner::new(store.clone(), self.engine.clone(), self.config.planning_timeout())
            .with_extractor(self.extractor.clone());
        let planned = tokio::select! {
            _ = cancel.cancelled() => {
                warn!("cancelled during planning");
                return Err(ShipyardError::Cancelled);
            }
            planned = planner.plan_once() => planned?,
        };

        let queue = WorkQueue::new();
        queue.push_all(planned.iter().map(|t| t.id))?;

        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let pool_token = cancel.child_token();
        let mut workers = JoinSet::new();
        for i in 0..self.config.num_workers {
            let worker = Worker::new(
                format!("worker-{i}"),
                store.clone(),
                self.engine.clone(),
                self.monitor.clone(),
                completions_tx.clone(),
                self.config.task_timeout(),
            )
            .with_classifier(self.classifier.clone());
            workers.spawn(worker.run(queue.clone(), pool_token.clone()));
        }
        drop(completions_tx);

        let judge = Judge::new(
            store.clone(),
            queue.clone(),
            self.engine.clone(),
            completions_rx,
            &self.config,
        )
        .with_progress(self.progress.clone())
        .with_monitor(self.monitor.clone())
        .with_extractor(self.extractor.clone());

        let judged = match tokio::spawn(judge.run(cancel.child_token())).await {
            Ok(result) => result,
            Err(e) => Err(ShipyardError::Orchestrator(format!("judge task failed: {e}"))),
        };

        pool_token.cancel();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) | Ok(Err(ShipyardError::Cancelled)) => {}
                Ok(Err(e)) => warn!(error = %e, "worker stopped with error"),
                Err(e) => error!(error = %e, "worker task failed"),
            }
        }

        let tasks = store.get_all_tasks().await;
        let work = store.get_work_state().await;
        let metrics = self.monitor.aggregate_metrics().await;
        match judged {
            Ok(judge_report) => {
                let report = RunReport::new(&tasks, work.project_context, judge_report, start)
                    .with_worker_metrics(metrics);
                info!(
                    duration_ms = report.elapsed_ms,
                    total = report.total_tasks,
                    completed = report.completed_tasks,
                    failed = report.failed_tasks,
                    busy_ms = report.worker_metrics.busy_ms,
                    "run complete"
                );
                Ok(report)
            }
            Err(e) => {
                let partial = RunReport::new(&tasks, work.project_context, JudgeReport::default(), start)
                    .with_worker_metrics(metrics);
                warn!(
                    error = %e,
                    interrupted = partial.interrupted_tasks,
                    completed = partial.completed_tasks,
                    total = partial.total_tasks,
                    "run stopped early"
                );
                Err(e)
            }
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub summary: String,
    pub project_context: Option<String>,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub pending_tasks: usize,
    /// Tasks still running when the run stopped.
    pub interrupted_tasks: usize,
    pub refine_rounds: u32,
    pub replan_rounds: u32,
    pub elapsed_ms: u64,
    /// Totals across the worker pool.
    #[serde(default)]
    pub worker_metrics: WorkerMetrics,
    pub tasks: Vec<Task>,
}

impl RunReport {
    pub fn new(
        tasks: &[Task],
        project_context: Option<String>,
        judge: JudgeReport,
        start: Instant,
    ) -> Self {
        let counts = TaskCounts::from_tasks(tasks);
        let summary = format!(
            "Run complete: {}/{} tasks completed, {} failed, {} refine and {} replan rounds",
            counts.completed, counts.total, counts.failed, judge.refine_rounds, judge.replan_rounds
        );

        Self {
            summary,
            project_context,
            total_tasks: counts.total,
            completed_tasks: counts.completed,
            failed_tasks: counts.failed,
            pending_tasks: counts.pending,
            interrupted_tasks: counts.running,
            refine_rounds: judge.refine_rounds,
            replan_rounds: judge.replan_rounds,
            elapsed_ms: start.elapsed().as_millis() as u64,
            worker_metrics: WorkerMetrics::default(),
            tasks: tasks.to_vec(),
        }
    }

    pub fn with_worker_metrics(mut self, metrics: WorkerMetrics) -> Self {
        self.worker_metrics = metrics;
        self
    }

    /// Completed tasks over total; 1.0 for an empty run.
    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / self.total_tasks as f64
    }
}
