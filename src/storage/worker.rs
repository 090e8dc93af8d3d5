use super::persistence::Persistence;
use crate::core::{PartitionId, Result, SweepError, TrackedObject};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct SaveRequest {
    pub partition: PartitionId,
    pub records: Vec<TrackedObject>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub partition: PartitionId,
    /// `None` on success.
    pub error: Option<String>,
}

/// Background writer for tracking snapshots.
///
/// Requests are handled strictly one at a time in submission order, so at
/// most one save is in flight and a later snapshot of a partition always
/// lands after an earlier one. Outcomes are reported back for the owner
/// thread to pick up with [`SaveWorker::drain_outcomes`].
pub struct SaveWorker {
    request_tx: Option<mpsc::UnboundedSender<SaveRequest>>,
    outcome_rx: mpsc::UnboundedReceiver<SaveOutcome>,
    join_handle: Option<JoinHandle<()>>,
}

impl SaveWorker {
    /// Spawns the worker on `runtime`. Callable from outside the runtime.
    pub fn spawn(persistence: Arc<dyn Persistence>, runtime: &Handle) -> Self {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<SaveRequest>();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel::<SaveOutcome>();

        let join_handle = runtime.spawn(async move {
            while let Some(request) = request_rx.recv().await {
                let partition = request.partition.clone();
                let persistence = Arc::clone(&persistence);
                let result = tokio::task::spawn_blocking(move || {
                    persistence.save(&request.partition, &request.records)
                })
                .await
                .map_err(|e| SweepError::persistence(&partition, format!("save task failed: {}", e)))
                .and_then(|result| result);

                let error = match result {
                    Ok(()) => {
                        debug!(partition = %partition, "tracking snapshot saved");
                        None
                    }
                    Err(err) => {
                        warn!(partition = %partition, error = %err, "tracking snapshot save failed");
                        Some(err.to_string())
                    }
                };
                let _ = outcome_tx.send(SaveOutcome { partition, error });
            }
        });

        Self {
            request_tx: Some(request_tx),
            outcome_rx,
            join_handle: Some(join_handle),
        }
    }

    pub fn submit(&self, request: SaveRequest) -> Result<()> {
        let tx = self.request_tx.as_ref().ok_or(SweepError::EngineStopped)?;
        tx.send(request).map_err(|_| SweepError::EngineStopped)
    }

    /// Outcomes that arrived since the last call. Never blocks.
    pub fn drain_outcomes(&mut self) -> Vec<SaveOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Stops accepting requests, waits for queued saves to finish and
    /// returns every outcome not yet drained.
    pub async fn shutdown(mut self) -> Result<Vec<SaveOutcome>> {
        self.request_tx.take();
        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|e| SweepError::IoError(format!("save worker join: {}", e)))?;
        }
        Ok(self.drain_outcomes())
    }
}

impl Drop for SaveWorker {
    fn drop(&mut self) {
        // Closing the queue lets the task finish pending saves and exit on its own.
        self.request_tx.take();
    }
}
