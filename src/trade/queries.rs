use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, PoisonError};

use serde::{Deserialize, Serialize};

use super::calculator::effective_volume;
use super::error::TradeError;
use super::lifecycle::{EngineMetrics, TradeEngine};
use super::pathfinding::{CacheStats, RouteSearch};
use crate::model::{MarketSnapshot, ProvinceTradeLedger, RegionId, Resource, RouteId, TradeHub, TradeRoute};

/// An exporter's supply must exceed its own demand by this factor to be offered.
const EXPORT_SURPLUS_RATIO: f64 = 1.2;

/// Monthly trade totals for one region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeBalance {
    pub export_value: f64,
    pub import_value: f64,
    /// Expected monthly profit of the region's outgoing routes.
    pub export_margin: f64,
    pub net: f64,
}

/// A profitable pairing of known markets with no route yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteOpportunity {
    pub source: RegionId,
    pub destination: RegionId,
    pub resource: Resource,
    pub source_price: f64,
    pub destination_price: f64,
    pub price_gap: f64,
}

impl TradeEngine {
    pub fn get_route(&self, id: RouteId) -> Option<TradeRoute> {
        self.lock_tables().routes.get(&id).cloned()
    }

    /// Routes with the region as either endpoint, outgoing first.
    pub fn routes_for_region(&self, region: RegionId) -> Vec<TradeRoute> {
        let tables = self.lock_tables();
        let Some(ledger) = tables.ledgers.get(&region) else {
            return Vec::new();
        };
        ledger
            .endpoint_routes()
            .filter_map(|id| tables.routes.get(id))
            .cloned()
            .collect()
    }

    pub fn routes_from(&self, region: RegionId) -> Vec<TradeRoute> {
        self.filter_routes(|r| r.source == region)
    }

    pub fn routes_to(&self, region: RegionId) -> Vec<TradeRoute> {
        self.filter_routes(|r| r.destination == region)
    }

    pub fn routes_for_resource(&self, resource: Resource) -> Vec<TradeRoute> {
        self.filter_routes(|r| r.resource == resource)
    }

    pub fn all_routes(&self) -> Vec<TradeRoute> {
        self.filter_routes(|_| true)
    }

    pub fn route_count(&self) -> usize {
        self.lock_tables().routes.len()
    }

    fn filter_routes(&self, keep: impl Fn(&TradeRoute) -> bool) -> Vec<TradeRoute> {
        self.lock_tables()
            .routes
            .values()
            .filter(|r| keep(r))
            .cloned()
            .collect()
    }

    /// Top `n` routes by expected monthly profit.
    pub fn most_profitable_routes(&self, n: usize) -> Vec<TradeRoute> {
        let mut routes = self.all_routes();
        routes.sort_by(|a, b| {
            b.expected_monthly_profit()
                .total_cmp(&a.expected_monthly_profit())
                .then_with(|| a.id.cmp(&b.id))
        });
        routes.truncate(n);
        routes
    }

    pub fn trading_partners(&self, region: RegionId) -> BTreeSet<RegionId> {
        self.lock_tables()
            .ledgers
            .get(&region)
            .map(|l| l.trading_partners.clone())
            .unwrap_or_default()
    }

    pub fn ledger(&self, region: RegionId) -> Option<ProvinceTradeLedger> {
        self.lock_tables().ledgers.get(&region).cloned()
    }

    pub fn province_balance(&self, region: RegionId) -> TradeBalance {
        let tables = self.lock_tables();
        let mut balance = TradeBalance::default();
        let Some(ledger) = tables.ledgers.get(&region) else {
            return balance;
        };
        for route in ledger.outgoing.iter().filter_map(|id| tables.routes.get(id)) {
            balance.export_value += route.source_price * effective_volume(route);
            balance.export_margin += route.expected_monthly_profit();
        }
        for route in ledger.incoming.iter().filter_map(|id| tables.routes.get(id)) {
            balance.import_value += route.destination_price * effective_volume(route);
        }
        balance.net = balance.export_value - balance.import_value;
        balance
    }

    pub fn hub(&self, region: RegionId) -> Option<TradeHub> {
        self.lock_tables().hubs.get(region).cloned()
    }

    pub fn hubs(&self) -> Vec<TradeHub> {
        self.lock_tables().hubs.hubs().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Markets
    // -----------------------------------------------------------------------

    /// Market state for a pair, opening the market on first query.
    pub fn get_market_data(
        &self,
        region: RegionId,
        resource: Resource,
    ) -> Result<MarketSnapshot, TradeError> {
        if !self.regions.region_exists(region) {
            return Err(TradeError::RegionNotFound(region));
        }
        let now = self.clock.now();
        Ok(self
            .lock_markets()
            .ensure(region, resource, self.regions.as_ref(), now)
            .clone())
    }

    pub fn best_markets(&self, resource: Resource, n: usize) -> Vec<MarketSnapshot> {
        self.lock_markets().best_markets(resource, n)
    }

    pub fn regional_average_price(
        &self,
        region: RegionId,
        resource: Resource,
        hops: usize,
    ) -> Option<f64> {
        self.lock_markets()
            .regional_average_price(self.finder.graph(), region, resource, hops)
    }

    /// Unrouted exporter/importer pairs among known markets, widest price gap first.
    pub fn find_route_opportunities(&self, limit: usize) -> Vec<RouteOpportunity> {
        let markets: Vec<MarketSnapshot> = self.lock_markets().snapshots().cloned().collect();
        let existing: HashSet<RouteId> = self.lock_tables().routes.keys().copied().collect();

        let exporters = markets.iter().filter(|m| {
            m.supply > m.demand * EXPORT_SURPLUS_RATIO
                && self.regions.can_produce(m.region, m.resource)
        });
        let mut found: Vec<RouteOpportunity> = Vec::new();
        for exporter in exporters {
            for importer in markets.iter().filter(|m| {
                m.resource == exporter.resource
                    && m.region != exporter.region
                    && m.demand > m.supply
                    && self.regions.can_receive(m.region, m.resource)
            }) {
                let id = RouteId::new(exporter.region, importer.region, exporter.resource);
                let gap = importer.current_price - exporter.current_price;
                if gap <= 0.0 || existing.contains(&id) {
                    continue;
                }
                found.push(RouteOpportunity {
                    source: exporter.region,
                    destination: importer.region,
                    resource: exporter.resource,
                    source_price: exporter.current_price,
                    destination_price: importer.current_price,
                    price_gap: gap,
                });
            }
        }
        found.sort_by(|a, b| {
            b.price_gap
                .total_cmp(&a.price_gap)
                .then_with(|| (a.source, a.destination, a.resource).cmp(&(b.source, b.destination, b.resource)))
        });
        found.truncate(limit);
        found
    }

    // -----------------------------------------------------------------------
    // Paths and metrics
    // -----------------------------------------------------------------------

    pub fn find_path(
        &self,
        source: RegionId,
        destination: RegionId,
        resource: Resource,
    ) -> Option<Arc<RouteSearch>> {
        self.finder.find(source, destination, resource)
    }

    pub fn find_path_uncached(
        &self,
        source: RegionId,
        destination: RegionId,
        resource: Resource,
    ) -> Option<RouteSearch> {
        self.finder.search_uncached(source, destination, resource)
    }

    pub fn path_cache_stats(&self) -> CacheStats {
        self.finder.cache_stats()
    }

    pub fn clear_path_cache(&self) {
        self.finder.clear_cache();
    }

    /// Live routes whose path crosses the link between `a` and `b`.
    pub fn link_load(&self, a: RegionId, b: RegionId) -> u32 {
        self.finder.link_load(a, b)
    }

    pub fn metrics(&self) -> EngineMetrics {
        *self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
