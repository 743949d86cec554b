pub mod event_log;
pub mod sim_resources;

pub use event_log::{EventLog, LoggedEvent};
pub use sim_resources::{
    HazardRng, MarketRng, OutboxHandle, SimConfig, SimRng, TradeEngineHandle, distribute_rng,
};
