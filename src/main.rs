use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use item_sweeper::world::{SimulatedObject, SimulatedWorld};
use item_sweeper::{
    Broadcaster, CleanupEngine, CleanupPolicy, FilePersistence, MemoryPersistence, PartitionId,
    Persistence, PolicyHandle, Position, RawSettings, Scheduler, TrackingRegistry,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Item kinds the simulation spawns, with the tag-groups each belongs to.
const KINDS: &[(&str, &[&str])] = &[
    ("minecraft:cobblestone", &[]),
    ("minecraft:dirt", &[]),
    ("minecraft:rotten_flesh", &[]),
    ("minecraft:arrow", &[]),
    ("minecraft:diamond", &["modid:valuable"]),
    ("minecraft:nether_star", &[]),
];

#[derive(Parser)]
#[command(name = "item-sweeper")]
#[command(about = "Age-ordered cleanup of dropped world objects")]
struct Cli {
    /// JSON settings file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive the engine against a simulated world for a number of ticks.
    Simulate {
        #[arg(long, default_value_t = 2_000)]
        ticks: u64,
        /// Objects present before the first tick.
        #[arg(long, default_value_t = 500)]
        items: usize,
        #[arg(long, default_value_t = 2)]
        spawn_per_tick: usize,
        /// Chance per tick that one random object is picked up.
        #[arg(long, default_value_t = 0.2)]
        pickup_chance: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value = "overworld")]
        partition: String,
        /// Persist tracking snapshots here. In-memory when omitted.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Preview one cycle over a population that has aged for `age_ticks`.
    DryRun {
        #[arg(long, default_value_t = 500)]
        items: usize,
        #[arg(long, default_value_t = 6_000)]
        age_ticks: u64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value = "overworld")]
        partition: String,
    },
    /// Print the effective settings after clamping.
    PrintConfig,
}

struct ConsoleBroadcaster;

impl Broadcaster for ConsoleBroadcaster {
    fn broadcast(&self, partition: &PartitionId, message: &str) {
        println!("[{}] {}", partition, message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("item_sweeper=info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Command::Simulate {
            ticks,
            items,
            spawn_per_tick,
            pickup_chance,
            seed,
            partition,
            data_dir,
        } => {
            simulate(
                settings,
                SimulationArgs {
                    ticks,
                    items,
                    spawn_per_tick,
                    pickup_chance,
                    seed,
                    partition: PartitionId::new(partition),
                },
                data_dir.as_deref(),
            )
            .await
        }
        Command::DryRun {
            items,
            age_ticks,
            seed,
            partition,
        } => dry_run(settings, items, age_ticks, seed, PartitionId::new(partition)),
        Command::PrintConfig => print_config(&settings),
    }
}

fn load_settings(path: Option<&Path>) -> Result<RawSettings> {
    match path {
        Some(path) => RawSettings::from_json_file(path)
            .with_context(|| format!("Failed to load settings from '{}'", path.display())),
        None => Ok(RawSettings::default()),
    }
}

struct SimulationArgs {
    ticks: u64,
    items: usize,
    spawn_per_tick: usize,
    pickup_chance: f64,
    seed: u64,
    partition: PartitionId,
}

async fn simulate(settings: RawSettings, args: SimulationArgs, data_dir: Option<&Path>) -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(args.seed);
    let mut world = SimulatedWorld::new();
    world.add_anchor(args.partition.clone(), Position::new(0.0, 64.0, 0.0));
    for _ in 0..args.items {
        spawn_random(&mut world, &mut rng, &args.partition);
    }

    let registry = match data_dir {
        Some(dir) => {
            let persistence: Arc<dyn Persistence> = Arc::new(
                FilePersistence::new(dir)
                    .with_context(|| format!("Failed to open data dir '{}'", dir.display()))?,
            );
            let worker = item_sweeper::SaveWorker::spawn(
                Arc::clone(&persistence),
                &tokio::runtime::Handle::current(),
            );
            TrackingRegistry::with_worker(persistence, worker)
        }
        None => TrackingRegistry::new(Arc::new(MemoryPersistence::new())),
    };

    let mut engine = CleanupEngine::new(PolicyHandle::from_settings(&settings), registry)
        .with_broadcaster(ConsoleBroadcaster)
        .with_scheduler(Scheduler::with_seed(args.seed));
    engine.on_partition_loaded(&args.partition);

    info!(
        ticks = args.ticks,
        items = args.items,
        partition = %args.partition,
        "starting simulation"
    );
    for tick in 0..args.ticks {
        for _ in 0..args.spawn_per_tick {
            spawn_random(&mut world, &mut rng, &args.partition);
        }
        if rng.random_bool(args.pickup_chance.clamp(0.0, 1.0)) {
            let ids = world.ids_in(&args.partition);
            if !ids.is_empty() {
                world.despawn(ids[rng.random_range(0..ids.len())]);
            }
        }
        engine.on_tick(&mut world, tick);
    }

    let stats = engine.stats();
    println!(
        "Finished after {} ticks: {} live objects, {} cycles, {} deleted, {} tracked, {} save failures",
        args.ticks,
        world.count(&args.partition),
        stats.cycles_run,
        stats.objects_deleted,
        stats.tracked_total(),
        stats.save_failures
    );

    if let Some(worker) = engine.close() {
        let outcomes = worker.shutdown().await?;
        let failed = outcomes.iter().filter(|o| o.error.is_some()).count();
        info!(pending = outcomes.len(), failed, "save worker stopped");
    }
    Ok(())
}

fn dry_run(settings: RawSettings, items: usize, age_ticks: u64, seed: u64, partition: PartitionId) -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut world = SimulatedWorld::new();
    world.add_anchor(partition.clone(), Position::new(0.0, 64.0, 0.0));
    let ids: Vec<_> = (0..items)
        .map(|_| spawn_random(&mut world, &mut rng, &partition))
        .collect();

    // Every object is treated as first seen at tick 0.
    let mut registry = TrackingRegistry::new(Arc::new(MemoryPersistence::new()));
    let store = registry.store_mut(&partition)?;
    for id in ids {
        if let Some(object) = world.object(id) {
            store.observe(id, object.position, Some(object.kind.clone()), 0);
        }
    }

    let mut engine = CleanupEngine::new(PolicyHandle::from_settings(&settings), registry);
    for report in engine.dry_run(&mut world, age_ticks, Some(&partition)) {
        println!("{}", report);
        println!("  {:?}", report.verdicts);
    }
    Ok(())
}

fn print_config(settings: &RawSettings) -> Result<()> {
    println!("{}", settings.to_json_pretty()?);
    println!("{:#?}", CleanupPolicy::bake(settings));
    Ok(())
}

fn spawn_random(world: &mut SimulatedWorld, rng: &mut SmallRng, partition: &PartitionId) -> item_sweeper::ObjectId {
    let (kind, groups) = KINDS[rng.random_range(0..KINDS.len())];
    let position = Position::new(
        rng.random_range(-96.0..96.0),
        64.0,
        rng.random_range(-96.0..96.0),
    );
    let mut object = SimulatedObject::new(partition.clone(), kind, position);
    for group in groups {
        object = object.in_group(*group);
    }
    if rng.random_bool(0.01) {
        object = object.named("Keepsake");
    }
    world.spawn(object)
}
