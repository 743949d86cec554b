pub mod db;
pub mod ecs;
pub mod flush;
pub mod model;
pub mod trade;

pub use model::{
    HubKind, MarketSnapshot, RegionGraph, RegionId, Resource, RouteId, RouteKind, RouteStatus,
    TradeHub, TradeRoute,
};
pub use trade::{TradeConfig, TradeEngine, TradeError, TradeEvent, TradeSnapshot};
