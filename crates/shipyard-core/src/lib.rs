//! Core error definitions for the Shipyard workspace.
//!
//! Every Shipyard crate reports failures through [`ShipyardError`]. The
//! variants map onto the three failure classes the orchestrator distinguishes:
//! per-task execution failures ([`ShipyardError::Engine`],
//! [`ShipyardError::Timeout`]), registry misuse ([`ShipyardError::Store`],
//! [`ShipyardError::InvalidTransition`]) and external cancellation
//! ([`ShipyardError::Cancelled`]).
//!
//! # Main types
//!
//! - [`ShipyardError`]: Unified error enum for all Shipyard subsystems.
//! - [`ShipyardResult`]: Convenience alias for `Result<T, ShipyardError>`.

use std::time::Duration;

/// Top-level error type for the Shipyard workspace.
#[derive(Debug, thiserror::Error)]
pub enum ShipyardError {
    /// The execution engine ran but reported a failure.
    #[error("Engine error: {0}")]
    Engine(String),

    /// The execution engine did not answer within its time budget.
    #[error("timeout after {}s", .0.as_secs())]
    Timeout(Duration),

    /// A registry operation referenced a missing or duplicate task, or the
    /// registry was already closed.
    #[error("Store error: {0}")]
    Store(String),

    /// A task status change that the lifecycle does not allow.
    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        /// The task the transition was attempted on.
        task_id: String,
        /// Status before the attempted transition.
        from: String,
        /// Requested status.
        to: String,
    },

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// The run was cancelled from outside (shutdown signal, parent task).
    #[error("cancelled")]
    Cancelled,

    /// An error from the run coordinator itself.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShipyardError {
    /// Whether this error came from an exceeded time budget.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ShipyardError::Timeout(_))
    }

    /// Whether this error is the cancellation signal unwinding.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ShipyardError::Cancelled)
    }
}

/// A convenience `Result` alias using [`ShipyardError`].
pub type ShipyardResult<T> = Result<T, ShipyardError>;
