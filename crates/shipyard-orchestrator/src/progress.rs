//! Progress reporting from the judge loop.
//!
//! The judge hands a [`ProgressSnapshot`] to a [`ProgressSink`] on every tick.
//! Sinks are best-effort: a sink that cannot deliver logs and carries on.

use crate::types::TaskCounts;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shipyard_core::ShipyardResult;
use std::path::PathBuf;
use tracing::{info, warn};

/// What the run looks like at one judge tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub counts: TaskCounts,
    /// `(worker id, task description)` for every busy worker.
    pub workers: Vec<(String, String)>,
    /// Current escalation tier, e.g. `executing` or `refining (2/10)`.
    pub phase: String,
    pub taken_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn new(counts: TaskCounts, workers: Vec<(String, String)>, phase: impl Into<String>) -> Self {
        Self {
            counts,
            workers,
            phase: phase.into(),
            taken_at: Utc::now(),
        }
    }

    /// Markdown rendering used by [`ProgressFile`].
    pub fn to_markdown(&self) -> String {
        let c = &self.counts;
        let mut out = String::from("# Shipyard progress\n\n");
        out.push_str(&format!("Updated: {}\n\n", self.taken_at.to_rfc3339()));
        out.push_str(&format!("Phase: {}\n\n", self.phase));
        out.push_str("| total | completed | running | pending | failed |\n");
        out.push_str("|---|---|---|---|---|\n");
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            c.total, c.completed, c.running, c.pending, c.failed
        ));
        if !self.workers.is_empty() {
            out.push_str("\n## Workers\n\n");
            for (worker, task) in &self.workers {
                out.push_str(&format!("- {worker}: {task}\n"));
            }
        }
        out
    }
}

/// Receives a snapshot on every judge tick.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, snapshot: &ProgressSnapshot) -> ShipyardResult<()>;
}

/// Logs each snapshot through `tracing`.
pub struct LogProgress;

#[async_trait]
impl ProgressSink for LogProgress {
    async fn report(&self, snapshot: &ProgressSnapshot) -> ShipyardResult<()> {
        let c = &snapshot.counts;
        info!(
            phase = %snapshot.phase,
            total = c.total,
            completed = c.completed,
            running = c.running,
            pending = c.pending,
            failed = c.failed,
            "progress"
        );
        for (worker, task) in &snapshot.workers {
            info!(worker = %worker, task = %task, "working");
        }
        Ok(())
    }
}

/// Rewrites a Markdown file with the latest snapshot.
///
/// Writes to a sibling temp file first and renames it over the target, so
/// readers never see a half-written file.
pub struct ProgressFile {
    path: PathBuf,
}

impl ProgressFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "progress.md".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ProgressSink for ProgressFile {
    async fn report(&self, snapshot: &ProgressSnapshot) -> ShipyardResult<()> {
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, snapshot.to_markdown()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Fans a snapshot out to several sinks. One failing sink does not stop the others.
pub struct MultiProgress {
    sinks: Vec<Box<dyn ProgressSink>>,
}

impl MultiProgress {
    pub fn new(sinks: Vec<Box<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl ProgressSink for MultiProgress {
    async fn report(&self, snapshot: &ProgressSnapshot) -> ShipyardResult<()> {
        for sink in &self.sinks {
            if let Err(e) = sink.report(snapshot).await {
                warn!(error = %e, "progress sink failed");
            }
        }
        Ok(())
    }
}
