//! Execution engine abstraction for Shipyard.
//!
//! Every stage of a run (planning, task execution, review, refinement,
//! replanning, validation) talks to the outside world through the
//! [`ExecutionEngine`] trait: one prompt in, text out, bounded by a timeout.
//!
//! # Main types
//!
//! - [`ExecutionEngine`]: Async prompt execution with a streaming variant.
//! - [`ClaudeCodeEngine`]: Runs the local `claude` CLI headless.
//! - [`EngineConfig`]: How the CLI is invoked.

/// Engine implementations.
pub mod backends;
/// CLI invocation settings.
pub mod config;

pub use backends::claude_code::ClaudeCodeEngine;
pub use backends::{EngineStream, ExecutionEngine};
pub use config::EngineConfig;
