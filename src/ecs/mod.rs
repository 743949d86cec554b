//! Hosts the trade engine inside a headless `bevy_app` tick schedule.

pub mod app;
pub mod clock;
pub mod commands;
pub mod conditions;
pub mod resources;
pub mod schedule;
pub mod systems;
pub mod test_helpers;
pub mod time;

pub use app::{
    build_sim_app_with_executor, build_trade_app, build_trade_app_deterministic,
    build_trade_app_with_executor,
};
pub use clock::{ClockHandle, SimClock};
pub use commands::{
    CommandOutcome, CommandOutput, TradeCommand, TradeCommandResults, apply_trade_commands,
};
pub use conditions::{daily, monthly, yearly};
pub use resources::{
    EventLog, HazardRng, LoggedEvent, MarketRng, OutboxHandle, SimConfig, SimRng, TradeEngineHandle,
};
pub use schedule::{SimPhase, SimTick, configure_sim_schedule};
pub use time::SimTime;
