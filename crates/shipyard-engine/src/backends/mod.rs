pub mod claude_code;

use async_trait::async_trait;
use shipyard_core::ShipyardResult;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Receiver of incremental output lines plus the handle resolving to the
/// aggregated output.
pub type EngineStream = (
    mpsc::Receiver<String>,
    JoinHandle<ShipyardResult<String>>,
);

/// The external execution engine every stage talks to.
///
/// Implementations must report an exceeded time budget as
/// [`ShipyardError::Timeout`](shipyard_core::ShipyardError::Timeout) so callers
/// can tell it apart from other failures.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Run one prompt to completion and return the captured output.
    async fn execute(&self, prompt: &str, timeout: Duration) -> ShipyardResult<String>;

    /// Streaming variant.
    ///
    /// The default implementation runs [`execute`](Self::execute) and replays
    /// its output line by line.
    async fn execute_stream(&self, prompt: &str, timeout: Duration) -> ShipyardResult<EngineStream> {
        let output = self.execute(prompt, timeout).await?;
        let (tx, rx) = mpsc::channel::<String>(64);
        let handle = tokio::spawn(async move {
            for line in output.lines() {
                if tx.send(line.to_string()).await.is_err() {
                    break;
                }
            }
            Ok(output)
        });
        Ok((rx, handle))
    }
}
