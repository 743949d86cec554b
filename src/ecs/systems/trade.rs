//! Trade systems.
//!
//! Every tick (Update phase):
//! 1. `process_route_batch`: one round-robin slice of routes
//!
//! Monthly systems (Update phase, chained after the batch):
//! 2. `tick_markets`: supply/demand drift, random shocks
//! 3. `roll_route_hazards`: bandit disruptions on exposed routes
//! 4. `refresh_hubs`: utilization, evolution, auto-designation
//! 5. `prune_unprofitable_routes`: abandon routes that stopped paying
//!
//! Reaction system (Reactions phase):
//! 6. `relay_trade_events`: outbox into `TradeEvent` messages and the `EventLog`

use bevy_app::App;
use bevy_ecs::message::MessageWriter;
use bevy_ecs::schedule::IntoScheduleConfigs;
use bevy_ecs::system::{Res, ResMut};

use crate::ecs::conditions::monthly;
use crate::ecs::resources::{EventLog, HazardRng, MarketRng, OutboxHandle, TradeEngineHandle};
use crate::ecs::schedule::{SimPhase, SimTick};
use crate::trade::TradeEvent;

// ---------------------------------------------------------------------------
// Plugin registration
// ---------------------------------------------------------------------------

pub fn add_trade_systems(app: &mut App) {
    app.add_systems(
        SimTick,
        process_route_batch.in_set(SimPhase::Update),
    );
    // Monthly systems (chained, after the batch)
    app.add_systems(
        SimTick,
        (
            tick_markets,
            roll_route_hazards,
            refresh_hubs,
            prune_unprofitable_routes,
        )
            .chain()
            .after(process_route_batch)
            .run_if(monthly)
            .in_set(SimPhase::Update),
    );
    app.add_systems(
        SimTick,
        relay_trade_events.in_set(SimPhase::Reactions),
    );
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

fn process_route_batch(engine: Res<TradeEngineHandle>) {
    engine.0.process_route_batch();
}

fn tick_markets(engine: Res<TradeEngineHandle>, mut rng: ResMut<MarketRng>) {
    engine.0.tick_markets(&mut rng.0);
}

fn roll_route_hazards(engine: Res<TradeEngineHandle>, mut rng: ResMut<HazardRng>) {
    let hit = engine.0.roll_route_hazards(&mut rng.0);
    if !hit.is_empty() {
        tracing::info!(routes = hit.len(), "route hazards struck");
    }
}

fn refresh_hubs(engine: Res<TradeEngineHandle>) {
    engine.0.refresh_hubs();
}

fn prune_unprofitable_routes(engine: Res<TradeEngineHandle>) {
    engine.0.prune_unprofitable_routes();
}

/// Move everything the engine published this tick into the log and out as messages.
fn relay_trade_events(
    outbox: Res<OutboxHandle>,
    mut log: ResMut<EventLog>,
    mut messages: MessageWriter<TradeEvent>,
) {
    for event in outbox.0.drain() {
        log.record(event.clone());
        messages.write(event);
    }
}
