use super::engine::EngineStats;
use crate::config::{PolicyHandle, RawSettings};
use crate::core::{PartitionId, Result, SweepError};
use crate::engine::CycleReport;
use tokio::sync::{mpsc, oneshot};

/// Administrative request queued for the engine's owner thread.
#[derive(Debug)]
pub enum AdminCommand {
    RunNow {
        partition: Option<PartitionId>,
        reply: oneshot::Sender<Vec<CycleReport>>,
    },
    DryRun {
        partition: Option<PartitionId>,
        reply: oneshot::Sender<Vec<CycleReport>>,
    },
    Stats {
        reply: oneshot::Sender<EngineStats>,
    },
}

/// Cloneable, `Send` trigger into a [`CleanupEngine`](super::CleanupEngine)
/// owned by another thread.
///
/// Requests never touch tracking state directly: they are queued and
/// executed by the owner the next time it drains its queue (at the start of
/// every tick). The `request_*` methods return the reply receiver
/// immediately; the async variants await it.
#[derive(Debug, Clone)]
pub struct EngineRemote {
    commands: mpsc::UnboundedSender<AdminCommand>,
    policy: PolicyHandle,
}

impl EngineRemote {
    pub(crate) fn new(commands: mpsc::UnboundedSender<AdminCommand>, policy: PolicyHandle) -> Self {
        Self { commands, policy }
    }

    fn send(&self, command: AdminCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| SweepError::EngineStopped)
    }

    pub fn request_run_now(
        &self,
        partition: Option<PartitionId>,
    ) -> Result<oneshot::Receiver<Vec<CycleReport>>> {
        let (reply, rx) = oneshot::channel();
        self.send(AdminCommand::RunNow { partition, reply })?;
        Ok(rx)
    }

    pub fn request_dry_run(
        &self,
        partition: Option<PartitionId>,
    ) -> Result<oneshot::Receiver<Vec<CycleReport>>> {
        let (reply, rx) = oneshot::channel();
        self.send(AdminCommand::DryRun { partition, reply })?;
        Ok(rx)
    }

    pub fn request_stats(&self) -> Result<oneshot::Receiver<EngineStats>> {
        let (reply, rx) = oneshot::channel();
        self.send(AdminCommand::Stats { reply })?;
        Ok(rx)
    }

    pub async fn run_now(&self, partition: Option<PartitionId>) -> Result<Vec<CycleReport>> {
        self.request_run_now(partition)?
            .await
            .map_err(|_| SweepError::EngineStopped)
    }

    pub async fn dry_run(&self, partition: Option<PartitionId>) -> Result<Vec<CycleReport>> {
        self.request_dry_run(partition)?
            .await
            .map_err(|_| SweepError::EngineStopped)
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        self.request_stats()?
            .await
            .map_err(|_| SweepError::EngineStopped)
    }

    /// Swaps in a freshly baked policy. Safe from any thread: the next
    /// tick picks up the new snapshot as a whole.
    pub fn reload(&self, raw: &RawSettings) -> Result<()> {
        self.policy.reload(raw)
    }
}
