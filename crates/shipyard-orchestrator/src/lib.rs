//! Goal-driven orchestration: a task store, a FIFO work queue, a worker pool
//! and a judge loop that retries, refines and replans until the goal is met.
//!
//! A run plans once, then workers drain the queue while the judge polls the
//! store. Failed tasks are retried up to a ceiling; when a batch finishes the
//! judge escalates to refinement and then to replanning, and ends the run once
//! neither produces new work.
//!
//! # Main types
//!
//! - [`Orchestrator`]: Runs one goal end to end and returns a [`RunReport`].
//! - [`TaskStore`]: Canonical task registry and goal state.
//! - [`WorkQueue`]: FIFO hand-off of task ids to the worker pool.
//! - [`Worker`]: One consumer in the pool.
//! - [`Judge`]: Supervisory loop with retry and escalation.
//! - [`Planner`], [`Refiner`], [`Replanner`]: Produce tasks from engine output.
//! - [`Validator`]: Checks a design before it is planned.

/// Orchestrator tuning loaded from configuration.
pub mod config;
/// Run coordinator and run report.
pub mod engine;
/// Task-list extraction from engine output.
pub mod extract;
/// Supervisory loop and escalation tiers.
pub mod judge;
/// Per-worker status and metrics.
pub mod monitor;
/// Initial goal decomposition.
pub mod planner;
/// Progress snapshots and sinks.
pub mod progress;
/// Prompt text for every engine call.
pub mod prompts;
/// Follow-up task generation.
pub mod refiner;
/// Goal-level gap analysis.
pub mod replanner;
/// Task registry and goal state.
pub mod store;
/// FIFO work queue.
pub mod task_queue;
/// Shared task types.
pub mod types;
/// Design validation.
pub mod validator;
/// Worker loop and output classification.
pub mod worker;

pub use config::OrchestratorConfig;
pub use engine::{Orchestrator, RunReport};
pub use extract::{TagExtractor, TaskExtractor};
pub use judge::{Judge, JudgeReport, Tier};
pub use monitor::{WorkerMetrics, WorkerMonitor, WorkerState, WorkerStatus};
pub use planner::Planner;
pub use progress::{LogProgress, MultiProgress, ProgressFile, ProgressSink, ProgressSnapshot};
pub use refiner::{HistoryWindow, Refiner};
pub use replanner::Replanner;
pub use store::{TaskStore, DEFAULT_MAX_RETRIES};
pub use task_queue::WorkQueue;
pub use types::{Task, TaskCounts, TaskOrigin, TaskStatus, TaskUpdate, WorkState};
pub use validator::{ValidationReport, Validator};
pub use worker::{MaxTurnsClassifier, OutputClassifier, Worker};
