use std::sync::Arc;

use bevy_app::App;
use bevy_ecs::message::MessageRegistry;
use bevy_ecs::schedule::{ExecutorKind, IntoScheduleConfigs};
use rand::SeedableRng;
use rand::rngs::SmallRng;

use super::clock::{ClockHandle, SimClock};
use super::commands::{TradeCommand, TradeCommandResults, apply_trade_commands};
use super::resources::{
    EventLog, HazardRng, MarketRng, OutboxHandle, SimConfig, SimRng, TradeEngineHandle,
    distribute_rng,
};
use super::schedule::{SimPhase, configure_sim_schedule};
use super::systems::add_trade_systems;
use super::time::SimTime;
use crate::model::RegionGraph;
use crate::trade::{
    ConfigError, EventOutbox, RegionDirectory, SharedClock, TradeConfig, TradeEngine, TradeEvent,
};

/// Build a headless Bevy app hosting a trade engine over the given map.
///
/// The engine reads the app's clock and publishes into an outbox the app drains every
/// tick. Manual tick control:
/// ```no_run
/// # use std::sync::Arc;
/// # use trade_sim::ecs::{build_trade_app, SimConfig, SimTick};
/// # use trade_sim::model::RegionGraph;
/// # use trade_sim::trade::{RegionCatalog, TradeConfig};
/// let mut app = build_trade_app(
///     SimConfig::default(),
///     TradeConfig::default(),
///     RegionGraph::new(),
///     Arc::new(RegionCatalog::new()),
/// )
/// .unwrap();
/// for _ in 0..360 {  // 1 year of daily ticks
///     app.world_mut().run_schedule(SimTick);
/// }
/// ```
pub fn build_trade_app(
    sim: SimConfig,
    trade: TradeConfig,
    graph: RegionGraph,
    regions: Arc<dyn RegionDirectory>,
) -> Result<App, ConfigError> {
    build_trade_app_with_executor(sim, trade, graph, regions, ExecutorKind::MultiThreaded)
}

/// Build the app with a single-threaded executor for reproducible determinism.
///
/// Use this when exact RNG consumption order across ticks must be identical across runs.
pub fn build_trade_app_deterministic(
    sim: SimConfig,
    trade: TradeConfig,
    graph: RegionGraph,
    regions: Arc<dyn RegionDirectory>,
) -> Result<App, ConfigError> {
    build_trade_app_with_executor(sim, trade, graph, regions, ExecutorKind::SingleThreaded)
}

/// Build the app with a specific executor kind.
pub fn build_trade_app_with_executor(
    sim: SimConfig,
    trade: TradeConfig,
    graph: RegionGraph,
    regions: Arc<dyn RegionDirectory>,
    executor: ExecutorKind,
) -> Result<App, ConfigError> {
    let clock = SharedClock::new(SimTime::from_year(sim.start_year));
    let outbox = Arc::new(EventOutbox::new());
    let engine = TradeEngine::new(
        trade,
        graph,
        regions,
        Arc::new(clock.clone()),
        outbox.clone(),
    )?;

    let mut app = build_sim_app_with_executor(&sim, executor);
    app.insert_resource(ClockHandle(clock));
    app.insert_resource(OutboxHandle(outbox));
    app.insert_resource(TradeEngineHandle(Arc::new(engine)));
    add_trade_systems(&mut app);
    Ok(app)
}

/// The bare host: clock, RNGs, event log, message types and the command applicator,
/// with no engine installed.
pub fn build_sim_app_with_executor(sim: &SimConfig, executor: ExecutorKind) -> App {
    let mut app = App::empty();

    // Core resources
    app.insert_resource(SimClock::with_step(sim.start_year, sim.step_minutes));
    app.insert_resource(EventLog::new());
    app.insert_resource(TradeCommandResults::default());
    app.insert_resource(SimRng {
        rng: SmallRng::seed_from_u64(sim.seed),
        seed: sim.seed,
    });
    app.insert_resource(sim.clone());

    // Per-domain RNG resources (reseeded each tick by distribute_rng)
    app.init_resource::<MarketRng>();
    app.init_resource::<HazardRng>();

    // Register message types
    MessageRegistry::register_message::<TradeCommand>(app.world_mut());
    MessageRegistry::register_message::<TradeEvent>(app.world_mut());

    // Build schedule with message rotation + applicator + RNG distribution
    let mut schedule = configure_sim_schedule(executor);
    schedule.add_systems(bevy_ecs::message::message_update_system.in_set(SimPhase::PreUpdate));
    schedule.add_systems(distribute_rng.in_set(SimPhase::PreUpdate));
    schedule.add_systems(apply_trade_commands.in_set(SimPhase::PostUpdate));
    app.add_schedule(schedule);
    app
}
