//! Supervisory loop.
//!
//! The judge polls the store on a fixed interval, retries failed tasks up to
//! the ceiling and, once a batch is finished, escalates: first refinement,
//! then replanning. The run is over when neither tier yields new work.

use crate::config::OrchestratorConfig;
use crate::extract::TaskExtractor;
use crate::monitor::WorkerMonitor;
use crate::progress::{LogProgress, ProgressSink, ProgressSnapshot};
use crate::prompts;
use crate::refiner::{HistoryWindow, Refiner};
use crate::replanner::Replanner;
use crate::store::TaskStore;
use crate::task_queue::WorkQueue;
use crate::types::{Task, TaskCounts, TaskStatus};
use serde::{Deserialize, Serialize};
use shipyard_core::{ShipyardError, ShipyardResult};
use shipyard_engine::ExecutionEngine;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Escalation tier the judge is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Executing,
    Refining { round: u32, max: u32 },
    Replanning { round: u32, max: u32 },
    Done,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Executing => write!(f, "executing"),
            Tier::Refining { round, max } => write!(f, "refining ({round}/{max})"),
            Tier::Replanning { round, max } => write!(f, "replanning ({round}/{max})"),
            Tier::Done => write!(f, "done"),
        }
    }
}

/// How the judge loop ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeReport {
    pub refine_rounds: u32,
    pub replan_rounds: u32,
    pub ticks: u64,
}

/// `tokio::time::interval` rejects a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

async fn guarded<F: Future>(cancel: &CancellationToken, fut: F) -> ShipyardResult<F::Output> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ShipyardError::Cancelled),
        out = fut => Ok(out),
    }
}

pub struct Judge {
    store: Arc<TaskStore>,
    queue: WorkQueue,
    engine: Arc<dyn ExecutionEngine>,
    refiner: Refiner,
    replanner: Replanner,
    monitor: Option<Arc<WorkerMonitor>>,
    progress: Arc<dyn ProgressSink>,
    completions: mpsc::UnboundedReceiver<Task>,
    poll_interval: Duration,
    review_timeout: Option<Duration>,
    max_refine_rounds: u32,
    max_replan_rounds: u32,
    refine_rounds: u32,
    replan_rounds: u32,
    tier: Tier,
    ticks: u64,
}

impl Judge {
    pub fn new(
        store: Arc<TaskStore>,
        queue: WorkQueue,
        engine: Arc<dyn ExecutionEngine>,
        completions: mpsc::UnboundedReceiver<Task>,
        config: &OrchestratorConfig,
    ) -> Self {
        let history = HistoryWindow {
            completed: config.history_completed,
            failed: config.history_failed,
        };
        let refiner = Refiner::new(store.clone(), engine.clone(), config.planning_timeout())
            .with_history(history);
        let replanner = Replanner::new(store.clone(), engine.clone(), config.planning_timeout())
            .with_history(history);

        Self {
            store,
            queue,
            engine,
            refiner,
            replanner,
            monitor: None,
            progress: Arc::new(LogProgress),
            completions,
            poll_interval: config.poll_interval().max(MIN_POLL_INTERVAL),
            review_timeout: config.review_completed.then(|| config.review_timeout()),
            max_refine_rounds: config.max_refine_rounds,
            max_replan_rounds: config.max_replan_rounds,
            refine_rounds: 0,
            replan_rounds: 0,
            tier: Tier::Executing,
            ticks: 0,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Source of the worker → task mapping in progress snapshots.
    pub fn with_monitor(mut self, monitor: Arc<WorkerMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TaskExtractor>) -> Self {
        self.refiner = self.refiner.with_extractor(extractor.clone());
        self.replanner = self.replanner.with_extractor(extractor);
        self
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Poll until the run is complete or the token is cancelled.
    pub async fn run(mut self, cancel: CancellationToken) -> ShipyardResult<JudgeReport> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.poll_interval.as_millis() as u64, "judge started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(tier = %self.tier, "judge cancelled");
                    return Err(ShipyardError::Cancelled);
                }
                _ = ticker.tick() => {}
            }

            match self.tick(&cancel).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(ShipyardError::Cancelled) => {
                    warn!(tier = %self.tier, "judge cancelled");
                    return Err(ShipyardError::Cancelled);
                }
                Err(e) => return Err(e),
            }
        }

        self.tier = Tier::Done;
        self.store.mark_complete().await;
        self.report_progress(self.store.counts().await).await;
        info!(
            refine_rounds = self.refine_rounds,
            replan_rounds = self.replan_rounds,
            ticks = self.ticks,
            "goal satisfied, run complete"
        );

        Ok(JudgeReport {
            refine_rounds: self.refine_rounds,
            replan_rounds: self.replan_rounds,
            ticks: self.ticks,
        })
    }

    /// One poll. Returns `true` when the run should end.
    async fn tick(&mut self, cancel: &CancellationToken) -> ShipyardResult<bool> {
        self.ticks += 1;
        self.review_completions(cancel).await?;

        let tasks = self.store.get_all_tasks().await;
        self.report_progress(TaskCounts::from_tasks(&tasks)).await;

        for task in tasks.iter().filter(|t| t.status == TaskStatus::Failed) {
            if self.store.retry_task(task.id).await? {
                info!(
                    task_id = %task.id,
                    retry = task.retries + 1,
                    max = self.store.max_retries(),
                    "retrying failed task"
                );
                self.queue.push(task.id)?;
            }
        }

        if !self.store.is_complete().await {
            return Ok(false);
        }

        if self.escalate(cancel).await? {
            return Ok(false);
        }
        Ok(true)
    }

    /// The tier that follows `from` given the rounds left.
    ///
    /// Escalation always starts at refinement while it has rounds, moves to
    /// replanning once refinement is spent or yields nothing, and ends in
    /// `Done` when neither tier has rounds left.
    fn next_tier(&self, from: Tier) -> Tier {
        let refine_left = self.refine_rounds < self.max_refine_rounds;
        let replan_left = self.replan_rounds < self.max_replan_rounds;
        match from {
            Tier::Executing if refine_left => Tier::Refining {
                round: self.refine_rounds + 1,
                max: self.max_refine_rounds,
            },
            Tier::Executing | Tier::Refining { .. } if replan_left => Tier::Replanning {
                round: self.replan_rounds + 1,
                max: self.max_replan_rounds,
            },
            _ => Tier::Done,
        }
    }

    /// Walk the escalation tiers until one yields work. `true` when new work
    /// was enqueued, in which case the judge is back to `Executing`.
    async fn escalate(&mut self, cancel: &CancellationToken) -> ShipyardResult<bool> {
        let mut tier = self.next_tier(Tier::Executing);
        loop {
            self.tier = tier;
            let added = match tier {
                Tier::Refining { round, max } => {
                    self.refine_rounds = round;
                    info!(round, max, "batch finished, refining");
                    guarded(cancel, self.refiner.refine()).await?
                }
                Tier::Replanning { round, max } => {
                    self.replan_rounds = round;
                    info!(round, max, "refinement exhausted, replanning");
                    guarded(cancel, self.replanner.replan()).await?
                }
                Tier::Executing | Tier::Done => return Ok(false),
            };

            if !added.is_empty() {
                info!(tier = %tier, count = added.len(), "escalation produced new tasks");
                self.queue.push_all(added.iter().map(|t| t.id))?;
                self.tier = Tier::Executing;
                return Ok(true);
            }
            tier = self.next_tier(tier);
        }
    }

    /// Drain completion notices, reviewing each one when enabled.
    async fn review_completions(&mut self, cancel: &CancellationToken) -> ShipyardResult<()> {
        let mut completed = Vec::new();
        while let Ok(task) = self.completions.try_recv() {
            completed.push(task);
        }
        let Some(timeout) = self.review_timeout else {
            return Ok(());
        };

        for task in completed {
            let prompt = prompts::review_prompt(&task);
            match guarded(cancel, self.engine.execute(&prompt, timeout)).await? {
                Ok(verdict) => {
                    let first = verdict.lines().next().unwrap_or_default();
                    info!(task_id = %task.id, verdict = %first, "task reviewed");
                }
                Err(e) => warn!(task_id = %task.id, error = %e, "review failed"),
            }
        }
        Ok(())
    }

    async fn report_progress(&self, counts: TaskCounts) {
        let workers = match &self.monitor {
            Some(monitor) => monitor.current_tasks().await,
            None => Vec::new(),
        };
        let snapshot = ProgressSnapshot::new(counts, workers, self.tier.to_string());
        if let Err(e) = self.progress.report(&snapshot).await {
            debug!(error = %e, "progress report failed");
        }
    }
}
