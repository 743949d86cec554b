use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::calculator::{
    hub_capacity, hub_infrastructure_bonus, hub_security, recalculate_profit_metrics,
};
use super::error::{TradeError, ValidationError};
use super::lifecycle::TradeEngine;
use crate::model::{MarketSnapshot, RouteId, RouteStatus, TradeHub, TradeRoute};

/// Everything the engine persists. Ledgers and congestion are derived on restore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeSnapshot {
    pub routes: Vec<TradeRoute>,
    pub hubs: Vec<TradeHub>,
    pub markets: Vec<MarketSnapshot>,
}

fn malformed(route: RouteId, reason: &str) -> TradeError {
    ValidationError::MalformedRoute {
        route,
        reason: reason.to_string(),
    }
    .into()
}

fn check_route(route: &TradeRoute) -> Result<(), TradeError> {
    if route.source == route.destination {
        return Err(ValidationError::SameRegion(route.source).into());
    }
    if route.id != RouteId::new(route.source, route.destination, route.resource) {
        return Err(malformed(route.id, "id does not match endpoints and resource"));
    }
    if !(0.0..=1.0).contains(&route.efficiency_rating) {
        return Err(ValidationError::InvalidEfficiency(route.efficiency_rating).into());
    }
    if route.path.first() != Some(&route.source) || route.path.last() != Some(&route.destination) {
        return Err(malformed(route.id, "path does not join the endpoints"));
    }
    if route.status == RouteStatus::Abandoned {
        return Err(malformed(route.id, "abandoned routes are not stored"));
    }
    Ok(())
}

/// Level-derived figures come from kind, level and base security; route sets are rebuilt.
fn rebuild_hub(mut hub: TradeHub) -> Result<TradeHub, TradeError> {
    let invalid = || ValidationError::InvalidHubLevel(hub.level);
    hub.capacity = hub_capacity(hub.kind, hub.level).ok_or_else(invalid)?;
    hub.infrastructure_bonus = hub_infrastructure_bonus(hub.level).ok_or_else(invalid)?;
    hub.security_rating = hub_security(hub.base_security, hub.level).ok_or_else(invalid)?;
    hub.outgoing_routes.clear();
    hub.incoming_routes.clear();
    hub.trading_partners.clear();
    Ok(hub)
}

impl TradeEngine {
    pub fn snapshot(&self) -> TradeSnapshot {
        let (routes, hubs) = {
            let tables = self.lock_tables();
            (
                tables.routes.values().cloned().collect(),
                tables.hubs.hubs().cloned().collect(),
            )
        };
        let markets = self.lock_markets().snapshots().cloned().collect();
        TradeSnapshot {
            routes,
            hubs,
            markets,
        }
    }

    /// Replace all engine state with a snapshot.
    ///
    /// Routes and hubs are validated first; nothing changes if any is malformed. Profit
    /// metrics and hub level figures are recomputed, and ledgers, hub route sets and link
    /// congestion rebuilt.
    pub fn restore(&self, snapshot: TradeSnapshot) -> Result<(), TradeError> {
        let TradeSnapshot {
            routes,
            hubs,
            markets,
        } = snapshot;
        for route in &routes {
            check_route(route)?;
        }
        let hubs = hubs
            .into_iter()
            .map(rebuild_hub)
            .collect::<Result<Vec<_>, _>>()?;
        let routes: BTreeMap<RouteId, TradeRoute> = routes
            .into_iter()
            .map(|mut r| {
                recalculate_profit_metrics(&mut r);
                (r.id, r)
            })
            .collect();

        {
            let mut tables = self.lock_tables();
            tables.routes.clear();
            tables.ledgers.clear();
            tables.batch_cursor = None;
            tables.hubs.restore(hubs);
            for route in routes.values() {
                tables.index_route(route);
            }
            self.finder
                .reset_congestion(routes.values().map(|r| r.path.as_slice()));
            tables.routes = routes.clone();
        }
        self.lock_markets().restore(markets);
        self.finder.clear_cache();

        tracing::info!(routes = routes.len(), "trade state restored");
        Ok(())
    }
}
