use super::remote::{AdminCommand, EngineRemote};
use crate::config::{PolicyHandle, RawSettings};
use crate::core::{PartitionId, Result};
use crate::engine::{CycleContext, CycleMode, CycleReport, Scheduler, run_cycle, tick_to_ms};
use crate::storage::{SaveWorker, TrackingRegistry};
use crate::world::{Broadcaster, NoopBroadcaster, ObjectStore};
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStats {
    pub partition: PartitionId,
    pub tracked: usize,
    pub oldest_first_seen_ms: Option<u64>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EngineStats {
    /// Loaded partitions, sorted by id.
    pub partitions: Vec<PartitionStats>,
    pub cycles_run: u64,
    pub objects_deleted: u64,
    pub save_failures: u64,
    pub next_due_tick: Option<u64>,
}

impl EngineStats {
    pub fn tracked_total(&self) -> usize {
        self.partitions.iter().map(|p| p.tracked).sum()
    }
}

/// Cleanup engine for one host process.
///
/// The engine is owned by the thread that mutates the world and is driven
/// from the host loop through [`CleanupEngine::on_tick`]. The world itself is
/// lent to every call rather than stored. Other threads talk to the engine
/// through an [`EngineRemote`].
///
/// # Examples
///
/// ```
/// use item_sweeper::{CleanupEngine, PolicyHandle, TrackingRegistry, MemoryPersistence};
/// use item_sweeper::world::SimulatedWorld;
/// use item_sweeper::core::Position;
/// use std::sync::Arc;
///
/// let mut world = SimulatedWorld::new();
/// world.add_anchor("overworld", Position::default());
///
/// let registry = TrackingRegistry::new(Arc::new(MemoryPersistence::new()));
/// let mut engine = CleanupEngine::new(PolicyHandle::default(), registry);
/// for tick in 0..100 {
///     engine.on_tick(&mut world, tick);
/// }
/// assert!(engine.stats().cycles_run > 0);
/// ```
pub struct CleanupEngine {
    policy: PolicyHandle,
    registry: TrackingRegistry,
    scheduler: Scheduler,
    broadcaster: Box<dyn Broadcaster>,
    commands_rx: mpsc::UnboundedReceiver<AdminCommand>,
    commands_tx: mpsc::UnboundedSender<AdminCommand>,
    cycles_run: u64,
    objects_deleted: u64,
}

impl CleanupEngine {
    pub fn new(policy: PolicyHandle, registry: TrackingRegistry) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            policy,
            registry,
            scheduler: Scheduler::new(),
            broadcaster: Box::new(NoopBroadcaster),
            commands_rx,
            commands_tx,
            cycles_run: 0,
            objects_deleted: 0,
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: impl Broadcaster + 'static) -> Self {
        self.broadcaster = Box::new(broadcaster);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn policy(&self) -> &PolicyHandle {
        &self.policy
    }

    pub fn registry(&self) -> &TrackingRegistry {
        &self.registry
    }

    pub fn remote(&self) -> EngineRemote {
        EngineRemote::new(self.commands_tx.clone(), self.policy.clone())
    }

    pub fn reload(&self, raw: &RawSettings) -> Result<()> {
        self.policy.reload(raw)
    }

    /// Warms the tracking store of a partition the host just loaded.
    pub fn on_partition_loaded(&mut self, partition: &PartitionId) {
        if let Err(err) = self.registry.warm(partition) {
            warn!(partition = %partition, error = %err, "failed to warm tracking store");
        }
    }

    /// Flushes and releases the tracking store of a partition the host
    /// unloaded. The store stays held while its save is unconfirmed.
    pub fn on_partition_unloaded(&mut self, partition: &PartitionId) {
        self.registry.unload(partition);
    }

    /// Host tick entry point. Returns the reports of any cycles the
    /// scheduler fired on this tick.
    pub fn on_tick<W: ObjectStore + ?Sized>(&mut self, world: &mut W, now_tick: u64) -> Vec<CycleReport> {
        self.drain_remote(world, now_tick);
        self.registry.reconcile_saves();

        let active: Vec<PartitionId> = world
            .partitions()
            .into_iter()
            .filter(|p| !world.anchors(p).is_empty())
            .collect();
        if active.is_empty() {
            return Vec::new();
        }

        let policy = self.policy.current();
        if !self.scheduler.poll(now_tick, &policy) {
            return Vec::new();
        }

        let reports = self.run_partitions(world, &active, now_tick, CycleMode::Apply);
        self.scheduler.rearm(now_tick, &policy);
        reports
    }

    /// Forces an applying cycle on one partition, or on every partition the
    /// host reports. Leaves the scheduler timer alone.
    pub fn run_now<W: ObjectStore + ?Sized>(
        &mut self,
        world: &mut W,
        now_tick: u64,
        partition: Option<&PartitionId>,
    ) -> Vec<CycleReport> {
        let partitions = Self::targets(world, partition);
        self.run_partitions(world, &partitions, now_tick, CycleMode::Apply)
    }

    /// Plans a cycle without deleting anything or updating tracking records.
    pub fn dry_run<W: ObjectStore + ?Sized>(
        &mut self,
        world: &mut W,
        now_tick: u64,
        partition: Option<&PartitionId>,
    ) -> Vec<CycleReport> {
        let partitions = Self::targets(world, partition);
        self.run_partitions(world, &partitions, now_tick, CycleMode::DryRun)
    }

    pub fn stats(&self) -> EngineStats {
        let mut partitions: Vec<PartitionStats> = self
            .registry
            .loaded()
            .map(|store| PartitionStats {
                partition: store.partition().clone(),
                tracked: store.len(),
                oldest_first_seen_ms: store.oldest_first_seen_ms(),
                dirty: store.is_dirty(),
            })
            .collect();
        partitions.sort_by(|a, b| a.partition.cmp(&b.partition));

        EngineStats {
            partitions,
            cycles_run: self.cycles_run,
            objects_deleted: self.objects_deleted,
            save_failures: self.registry.save_failures(),
            next_due_tick: self.scheduler.next_due(),
        }
    }

    /// Executes queued remote commands on the calling (owner) thread.
    pub fn drain_remote<W: ObjectStore + ?Sized>(&mut self, world: &mut W, now_tick: u64) -> usize {
        let mut handled = 0;
        while let Ok(command) = self.commands_rx.try_recv() {
            handled += 1;
            match command {
                AdminCommand::RunNow { partition, reply } => {
                    let reports = self.run_now(world, now_tick, partition.as_ref());
                    let _ = reply.send(reports);
                }
                AdminCommand::DryRun { partition, reply } => {
                    let reports = self.dry_run(world, now_tick, partition.as_ref());
                    let _ = reply.send(reports);
                }
                AdminCommand::Stats { reply } => {
                    let _ = reply.send(self.stats());
                }
            }
        }
        if handled > 0 {
            debug!(handled, "remote cleanup commands executed");
        }
        handled
    }

    /// Persists every dirty tracking store. Returns how many were saved or queued.
    pub fn flush(&mut self) -> usize {
        self.registry.flush_all()
    }

    /// Flushes pending state and hands back the background save worker, if
    /// any, so the caller can await its shutdown.
    pub fn close(mut self) -> Option<SaveWorker> {
        self.registry.flush_all();
        self.registry.take_worker()
    }

    fn targets<W: ObjectStore + ?Sized>(world: &W, partition: Option<&PartitionId>) -> Vec<PartitionId> {
        match partition {
            Some(p) => vec![p.clone()],
            None => world.partitions(),
        }
    }

    fn run_partitions<W: ObjectStore + ?Sized>(
        &mut self,
        world: &mut W,
        partitions: &[PartitionId],
        now_tick: u64,
        mode: CycleMode,
    ) -> Vec<CycleReport> {
        // One snapshot for the whole firing, even if a reload lands meanwhile.
        let policy = self.policy.current();
        let now_ms = tick_to_ms(now_tick);
        let mut reports = Vec::with_capacity(partitions.len());

        for partition in partitions {
            let ctx = CycleContext {
                world: &mut *world,
                registry: &mut self.registry,
                policy: policy.as_ref(),
                broadcaster: self.broadcaster.as_ref(),
            };
            let report = run_cycle(ctx, partition, now_ms, mode);
            if mode == CycleMode::Apply {
                self.cycles_run += 1;
                self.objects_deleted += report.deleted as u64;
            }
            reports.push(report);
        }
        reports
    }
}
