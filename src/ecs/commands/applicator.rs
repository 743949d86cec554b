use bevy_ecs::message::Messages;
use bevy_ecs::world::World;

use crate::ecs::clock::SimClock;
use crate::ecs::resources::TradeEngineHandle;
use crate::trade::{TradeEngine, TradeError};

use super::{CommandOutcome, CommandOutput, TradeCommand, TradeCommandResults};

fn apply(engine: &TradeEngine, command: &TradeCommand) -> Result<CommandOutput, TradeError> {
    match command {
        TradeCommand::EstablishRoute {
            source,
            destination,
            resource,
            preferred_kind,
        } => engine
            .establish_route(*source, *destination, *resource, *preferred_kind)
            .map(CommandOutput::Established),
        TradeCommand::DisruptRoute {
            route,
            cause,
            duration_months,
        } => engine
            .disrupt_route(*route, cause, *duration_months)
            .map(CommandOutput::Disrupted),
        TradeCommand::RecoverRoute { route } => {
            engine.recover_route(*route).map(|()| CommandOutput::Applied)
        }
        TradeCommand::AbandonRoute { route } => {
            engine.abandon_route(*route).map(|()| CommandOutput::Applied)
        }
        TradeCommand::CreateHub { region, name, kind } => engine
            .create_hub(*region, name, *kind)
            .map(|()| CommandOutput::Applied),
        TradeCommand::UpgradeHub { region, level } => engine
            .upgrade_hub(*region, *level)
            .map(|()| CommandOutput::Applied),
        TradeCommand::PriceShock {
            region,
            resource,
            magnitude,
            cause,
        } => engine
            .apply_price_shock(*region, *resource, *magnitude, cause)
            .map(|()| CommandOutput::Applied),
    }
}

/// Exclusive system that drains all pending `TradeCommand` messages, runs each
/// against the engine, and records the outcomes in `TradeCommandResults`.
///
/// Runs in `SimPhase::PostUpdate`. Engine events land in the outbox and are relayed
/// in `SimPhase::Reactions` of the same tick.
pub fn apply_trade_commands(world: &mut World) {
    let commands: Vec<TradeCommand> = {
        let Some(mut messages) = world.get_resource_mut::<Messages<TradeCommand>>() else {
            return;
        };
        messages.drain().collect()
    };

    if commands.is_empty() {
        return;
    }

    let Some(engine) = world.get_resource::<TradeEngineHandle>().map(|h| h.0.clone()) else {
        tracing::warn!(
            dropped = commands.len(),
            "trade commands dropped: no engine installed"
        );
        return;
    };
    let tick = world.resource::<SimClock>().tick_count;

    let outcomes: Vec<CommandOutcome> = commands
        .into_iter()
        .map(|command| {
            let result = apply(&engine, &command);
            match &result {
                Ok(_) => tracing::debug!(command = command.label(), "trade command applied"),
                Err(err) => tracing::warn!(
                    command = command.label(),
                    kind = ?err.kind(),
                    %err,
                    "trade command rejected"
                ),
            }
            CommandOutcome {
                tick,
                command,
                result,
            }
        })
        .collect();

    world
        .get_resource_or_init::<TradeCommandResults>()
        .0
        .extend(outcomes);
}
