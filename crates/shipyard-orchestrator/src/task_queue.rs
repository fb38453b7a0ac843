use shipyard_core::{ShipyardError, ShipyardResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// FIFO hand-off of ready task ids from producers to the worker pool.
///
/// Any number of producers may push. Consumers share a single receiver behind
/// an async mutex, so each id is delivered to exactly one worker and ids come
/// out in push order. Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<Uuid>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Uuid>>>,
    depth: Arc<AtomicUsize>,
}

impl WorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Enqueue a task id.
    pub fn push(&self, id: Uuid) -> ShipyardResult<()> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.tx.send(id).map_err(|_| {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            ShipyardError::Orchestrator("work queue closed".into())
        })
    }

    /// Enqueue several ids in order.
    pub fn push_all(&self, ids: impl IntoIterator<Item = Uuid>) -> ShipyardResult<()> {
        for id in ids {
            self.push(id)?;
        }
        Ok(())
    }

    /// Wait for the next id.
    ///
    /// Cancel-safe: dropping the future before it resolves loses nothing.
    pub async fn pop(&self) -> Option<Uuid> {
        let mut rx = self.rx.lock().await;
        let id = rx.recv().await?;
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Some(id)
    }

    /// Ids pushed but not yet handed to a worker.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
