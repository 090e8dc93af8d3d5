//! Scheduling, remote administration and background saves

use item_sweeper::world::SimulatedWorld;
use item_sweeper::{
    CleanupEngine, MemoryPersistence, PartitionId, PolicyHandle, Position, RawSettings, SaveWorker,
    Scheduler, TrackingRegistry,
};
use std::sync::Arc;
use tokio::runtime::Handle;

fn fixed_interval(interval: i64) -> RawSettings {
    RawSettings {
        scan_interval_ticks: interval,
        jitter_enabled: false,
        entity_count_threshold: 10,
        min_item_age_ms: 0,
        filter_list: Vec::new(),
        ..RawSettings::default()
    }
}

fn crowded_world(items: usize) -> SimulatedWorld {
    let mut world = SimulatedWorld::new();
    world.add_anchor("overworld", Position::new(0.0, 64.0, 0.0));
    for i in 0..items {
        world.spawn_item(
            "overworld",
            "minecraft:dirt",
            Position::new(40.0, 64.0, i as f64 * 0.5),
        );
    }
    world
}

fn engine(raw: &RawSettings) -> CleanupEngine {
    CleanupEngine::new(
        PolicyHandle::from_settings(raw),
        TrackingRegistry::new(Arc::new(MemoryPersistence::new())),
    )
    .with_scheduler(Scheduler::with_seed(9))
}

#[test]
fn test_first_tick_only_arms_scheduler() {
    let mut world = crowded_world(40);
    let mut engine = engine(&fixed_interval(20));

    assert!(engine.on_tick(&mut world, 0).is_empty());
    assert_eq!(engine.stats().next_due_tick, Some(20));
    for tick in 1..20 {
        assert!(engine.on_tick(&mut world, tick).is_empty());
    }

    let reports = engine.on_tick(&mut world, 20);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].deleted, 30);
    assert_eq!(engine.stats().next_due_tick, Some(40));
    assert_eq!(engine.stats().cycles_run, 1);
}

#[test]
fn test_no_anchor_means_no_scheduling() {
    let mut world = crowded_world(40);
    world.clear_anchors(&PartitionId::from("overworld"));
    let mut engine = engine(&fixed_interval(5));

    for tick in 0..100 {
        assert!(engine.on_tick(&mut world, tick).is_empty());
    }
    let stats = engine.stats();
    assert_eq!(stats.next_due_tick, None);
    assert_eq!(stats.cycles_run, 0);
    assert_eq!(world.count(&PartitionId::from("overworld")), 40);
}

#[test]
fn test_fires_on_every_interval() {
    let mut world = SimulatedWorld::new();
    world.add_anchor("overworld", Position::default());
    let mut engine = engine(&fixed_interval(7));

    let fired: Vec<u64> = (0..50)
        .filter(|tick| !engine.on_tick(&mut world, *tick).is_empty())
        .collect();
    assert_eq!(fired, vec![7, 14, 21, 28, 35, 42, 49]);
}

#[test]
fn test_admin_runs_leave_schedule_alone() {
    let mut world = crowded_world(40);
    let mut engine = engine(&fixed_interval(20));

    engine.on_tick(&mut world, 0);
    assert_eq!(engine.stats().next_due_tick, Some(20));

    let preview = engine.dry_run(&mut world, 5, None);
    assert_eq!(preview[0].budget.to_delete, 30);
    assert_eq!(engine.stats().next_due_tick, Some(20));

    let run = engine.run_now(&mut world, 7, None);
    assert_eq!(run[0].deleted, 30);
    assert_eq!(engine.stats().next_due_tick, Some(20));

    for tick in 8..20 {
        assert!(engine.on_tick(&mut world, tick).is_empty());
    }
    assert_eq!(engine.on_tick(&mut world, 20).len(), 1);
    assert_eq!(engine.stats().next_due_tick, Some(40));
}

#[test]
fn test_reload_applies_to_next_cycle() {
    let mut world = crowded_world(40);
    let mut engine = engine(&fixed_interval(20));
    let remote = engine.remote();

    let raw = RawSettings {
        entity_count_threshold: 100,
        ..fixed_interval(20)
    };
    std::thread::spawn(move || remote.reload(&raw))
        .join()
        .unwrap()
        .unwrap();
    assert_eq!(engine.policy().current().entity_count_threshold, 100);

    let report = engine.run_now(&mut world, 0, None).remove(0);
    assert_eq!(report.threshold, 100);
    assert_eq!(report.deleted, 0);
}

#[test]
fn test_remote_requests_run_on_owner_tick() {
    let mut world = crowded_world(40);
    let mut engine = engine(&fixed_interval(1_000));
    let remote = engine.remote();

    let mut preview = remote.request_dry_run(None).unwrap();
    let mut run = remote
        .request_run_now(Some(PartitionId::from("overworld")))
        .unwrap();
    let mut stats = remote.request_stats().unwrap();
    assert!(preview.try_recv().is_err());

    engine.on_tick(&mut world, 0);

    let preview = preview.try_recv().unwrap();
    assert_eq!(preview[0].budget.to_delete, 30);
    assert_eq!(preview[0].deleted, 0);

    let run = run.try_recv().unwrap();
    assert_eq!(run[0].deleted, 30);

    let stats = stats.try_recv().unwrap();
    assert_eq!(stats.objects_deleted, 30);
    assert_eq!(stats.partitions.len(), 1);
    assert_eq!(stats.partitions[0].tracked, 10);
}

#[test]
fn test_remote_reports_stopped_engine() {
    let engine = engine(&fixed_interval(20));
    let remote = engine.remote();
    drop(engine);

    assert!(remote.request_stats().is_err());
    assert!(tokio_test::block_on(remote.run_now(None)).is_err());
}

#[tokio::test]
async fn test_async_remote_round_trip() {
    let mut world = crowded_world(40);
    let mut engine = engine(&fixed_interval(1_000));
    let remote = engine.remote();

    let handle = tokio::spawn(async move { remote.run_now(None).await });
    while !handle.is_finished() {
        engine.drain_remote(&mut world, 0);
        tokio::task::yield_now().await;
    }

    let reports = handle.await.unwrap().unwrap();
    assert_eq!(reports[0].deleted, 30);
}

#[tokio::test]
async fn test_background_saves_flush_on_close() {
    let persistence = Arc::new(MemoryPersistence::new());
    let worker = SaveWorker::spawn(persistence.clone(), &Handle::current());
    let mut engine = CleanupEngine::new(
        PolicyHandle::from_settings(&fixed_interval(20)),
        TrackingRegistry::with_worker(persistence.clone(), worker),
    );
    let mut world = crowded_world(40);
    let overworld = PartitionId::from("overworld");

    let report = engine.run_now(&mut world, 0, None).remove(0);
    assert!(report.persisted);

    let worker = engine.close().unwrap();
    let outcomes = worker.shutdown().await.unwrap();
    assert!(outcomes.iter().all(|o| o.error.is_none()));
    assert_eq!(persistence.saved(&overworld).unwrap().len(), 10);
}

#[tokio::test]
async fn test_failed_background_save_is_retried() {
    let persistence = Arc::new(MemoryPersistence::new());
    persistence.set_fail_saves(true);
    let worker = SaveWorker::spawn(persistence.clone(), &Handle::current());
    let mut engine = CleanupEngine::new(
        PolicyHandle::from_settings(&fixed_interval(1_000)),
        TrackingRegistry::with_worker(persistence.clone(), worker),
    );
    let mut world = crowded_world(40);
    let overworld = PartitionId::from("overworld");

    engine.run_now(&mut world, 0, None);
    while engine.stats().save_failures == 0 {
        engine.on_tick(&mut world, 1);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert!(engine.stats().partitions[0].dirty);

    persistence.set_fail_saves(false);
    let worker = engine.close().unwrap();
    let outcomes = worker.shutdown().await.unwrap();
    assert!(outcomes.iter().any(|o| o.error.is_none()));
    assert_eq!(persistence.saved(&overworld).unwrap().len(), 10);
}
