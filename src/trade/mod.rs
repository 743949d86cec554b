//! The trade engine: route discovery, the route lifecycle, hubs and markets.

pub mod calculator;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod hubs;
pub mod lifecycle;
pub mod market;
pub mod pathfinding;
pub mod processing;
pub mod queries;
pub mod snapshot;

pub use calculator::RevenueImpact;
pub use collaborators::{
    EventOutbox, RegionCatalog, RegionDirectory, SharedClock, TimeSource, TradeEventSink,
};
pub use config::{
    ConfigError, HubConfig, MarketConfig, PathfindingConfig, RecoveryConfig, SchedulerConfig,
    TradeConfig,
};
pub use error::{ErrorKind, TradeError, ValidationError};
pub use events::TradeEvent;
pub use hubs::HubRegistry;
pub use lifecycle::{EngineMetrics, EstablishedRoute, RENEWAL_CAUSE, TradeEngine};
pub use market::{MarketEngine, MarketFlows};
pub use pathfinding::{CacheStats, PathResult, RouteFinder, RouteSearch};
pub use processing::BatchReport;
pub use queries::{RouteOpportunity, TradeBalance};
pub use snapshot::TradeSnapshot;
