#[macro_use]
mod macros;

pub mod geography;
pub mod hub;
pub mod ledger;
pub mod market;
pub mod region;
pub mod resource;
pub mod route;

pub use geography::{LinkSpec, RegionGraph, RegionLink, RegionNode};
pub use hub::{HubKind, MAX_HUB_LEVEL, MIN_HUB_LEVEL, TradeHub};
pub use ledger::ProvinceTradeLedger;
pub use market::{ActiveShock, MarketSnapshot, PRICE_HISTORY_LEN, PriceTrend};
pub use region::RegionId;
pub use resource::{Resource, TradeGood};
pub use route::{
    Disruption, PathFeatures, ProfitMetrics, RouteId, RouteKind, RouteStatus, TradeRoute,
};
