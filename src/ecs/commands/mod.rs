pub mod applicator;

use bevy_ecs::message::Message;
use bevy_ecs::resource::Resource;

use crate::model::{HubKind, RegionId, Resource as Good, RouteId, RouteKind};
use crate::trade::{EstablishedRoute, RevenueImpact, TradeError};

pub use applicator::apply_trade_commands;

/// An operation requested of the trade engine from inside the app.
///
/// Systems (or the host, between ticks) emit these via `MessageWriter<TradeCommand>`.
/// The applicator in `SimPhase::PostUpdate` runs each one against the engine and
/// records the outcome in `TradeCommandResults`.
#[derive(Message, Clone, Debug, PartialEq)]
pub enum TradeCommand {
    EstablishRoute {
        source: RegionId,
        destination: RegionId,
        resource: Good,
        preferred_kind: RouteKind,
    },
    DisruptRoute {
        route: RouteId,
        cause: String,
        duration_months: f64,
    },
    RecoverRoute {
        route: RouteId,
    },
    AbandonRoute {
        route: RouteId,
    },
    CreateHub {
        region: RegionId,
        name: String,
        kind: HubKind,
    },
    UpgradeHub {
        region: RegionId,
        level: u8,
    },
    PriceShock {
        region: RegionId,
        resource: Good,
        magnitude: f64,
        cause: String,
    },
}

impl TradeCommand {
    pub fn label(&self) -> &'static str {
        match self {
            TradeCommand::EstablishRoute { .. } => "establish_route",
            TradeCommand::DisruptRoute { .. } => "disrupt_route",
            TradeCommand::RecoverRoute { .. } => "recover_route",
            TradeCommand::AbandonRoute { .. } => "abandon_route",
            TradeCommand::CreateHub { .. } => "create_hub",
            TradeCommand::UpgradeHub { .. } => "upgrade_hub",
            TradeCommand::PriceShock { .. } => "price_shock",
        }
    }
}

/// What a successful command returned.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutput {
    Established(EstablishedRoute),
    Disrupted(RevenueImpact),
    Applied,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommandOutcome {
    pub tick: u64,
    pub command: TradeCommand,
    pub result: Result<CommandOutput, TradeError>,
}

impl CommandOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes of applied commands, oldest first. Grows until the host drains it.
#[derive(Resource, Debug, Clone, Default)]
pub struct TradeCommandResults(pub Vec<CommandOutcome>);

impl TradeCommandResults {
    pub fn failures(&self) -> impl Iterator<Item = &CommandOutcome> {
        self.0.iter().filter(|o| !o.is_ok())
    }

    /// Take every recorded outcome, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<CommandOutcome> {
        std::mem::take(&mut self.0)
    }
}
