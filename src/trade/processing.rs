//! Periodic work: the batch-bounded route tick and the monthly market, hazard, hub
//! and pruning passes.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::PoisonError;
use std::time::{Duration, Instant};

use rand::Rng;

use super::calculator::{
    effective_volume, percentage_change, recalculate_profit_metrics, seasonal_route_modifier,
};
use super::error::TradeError;
use super::events::TradeEvent;
use super::lifecycle::{TradeEngine, progress_recovery};
use super::market::MarketFlows;
use crate::ecs::time::SimTime;
use crate::model::{RegionId, Resource, RouteId, RouteKind, RouteStatus, TradeRoute};

/// What one route batch tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub processed: usize,
    pub committed: usize,
    /// Routes skipped because another commit landed while they were being computed.
    pub conflicts: usize,
    pub events: usize,
    pub elapsed: Duration,
}

impl TradeEngine {
    /// Process the next `route_batch_size` routes in round-robin order: recovery
    /// progression, seasonal closure, repricing and lifetime accrual.
    pub fn process_route_batch(&self) -> BatchReport {
        let started = Instant::now();
        let now = self.clock.now();
        let batch = self.next_batch();

        // Prices for every endpoint in the batch, read under the market lock alone.
        let prices: BTreeMap<(RegionId, Resource), f64> = {
            let mut markets = self.lock_markets();
            let regions = self.regions.as_ref();
            batch
                .iter()
                .flat_map(|r| [(r.source, r.resource), (r.destination, r.resource)])
                .map(|(region, resource)| {
                    ((region, resource), markets.price(region, resource, regions, now))
                })
                .collect()
        };

        let updates: Vec<(TradeRoute, Vec<TradeEvent>)> = batch
            .into_iter()
            .map(|route| self.advance_route(route, now, &prices))
            .collect();

        let mut report = BatchReport {
            processed: updates.len(),
            ..BatchReport::default()
        };
        let mut publish = Vec::new();
        {
            let mut tables = self.lock_tables();
            for (mut route, events) in updates {
                let Some(current) = tables.routes.get_mut(&route.id) else {
                    report.conflicts += 1;
                    continue;
                };
                if current.revision != route.revision {
                    tracing::debug!(route = %route.id, "batch update lost a race; skipped");
                    report.conflicts += 1;
                    continue;
                }
                route.revision += 1;
                *current = route;
                report.committed += 1;
                publish.extend(events);
            }
        }
        report.events = publish.len();
        self.publish_all(publish);

        report.elapsed = started.elapsed();
        self.record_batch(&report);
        report
    }

    fn next_batch(&self) -> Vec<TradeRoute> {
        let size = self.config.scheduler.route_batch_size;
        let mut tables = self.lock_tables();
        let start = match tables.batch_cursor {
            Some(cursor) => Bound::Excluded(cursor),
            None => Bound::Unbounded,
        };
        let mut batch: Vec<TradeRoute> = tables
            .routes
            .range((start, Bound::Unbounded))
            .take(size)
            .map(|(_, r)| r.clone())
            .collect();
        if batch.len() < size {
            let wrap = size.min(tables.routes.len()) - batch.len();
            let taken: Vec<RouteId> = batch.iter().map(|r| r.id).collect();
            batch.extend(
                tables
                    .routes
                    .values()
                    .filter(|r| !taken.contains(&r.id))
                    .take(wrap)
                    .cloned(),
            );
        }
        tables.batch_cursor = batch.last().map(|r| r.id);
        batch
    }

    fn advance_route(
        &self,
        mut route: TradeRoute,
        now: SimTime,
        prices: &BTreeMap<(RegionId, Resource), f64>,
    ) -> (TradeRoute, Vec<TradeEvent>) {
        let mut events = Vec::new();
        let old_volume = effective_volume(&route);

        // Accrue at the rates in force since the last visit.
        let months = now.fractional_months_since(route.last_processed);
        route.total_goods_moved += old_volume * months;
        route.lifetime_profit += route.expected_monthly_profit() * months;
        route.last_processed = now;

        let mut reason = "market conditions";
        if progress_recovery(&mut route, now, &mut events) {
            reason = "recovery";
        }

        let closes_in_winter =
            route.kind == RouteKind::Sea && self.config.scheduler.close_sea_routes_in_winter;
        match route.status {
            RouteStatus::Active if closes_in_winter && !route.is_recovering && now.is_winter() => {
                route.status = RouteStatus::SeasonallyClosed;
                reason = "seasonal closure";
                tracing::debug!(route = %route.id, "closed for winter");
            }
            RouteStatus::SeasonallyClosed if !(closes_in_winter && now.is_winter()) => {
                route.status = RouteStatus::Active;
                reason = "seasonal reopening";
                tracing::debug!(route = %route.id, "reopened after winter");
            }
            _ => {}
        }

        if let Some(price) = prices.get(&(route.source, route.resource)) {
            route.source_price = *price;
        }
        if let Some(price) = prices.get(&(route.destination, route.resource)) {
            route.destination_price = *price;
        }
        route.seasonal_modifier = seasonal_route_modifier(route.kind, now.month());
        recalculate_profit_metrics(&mut route);

        let new_volume = effective_volume(&route);
        let threshold = self.config.scheduler.volume_event_threshold;
        let moved = if old_volume > 0.0 {
            ((new_volume - old_volume) / old_volume).abs() >= threshold
        } else {
            new_volume > 0.0
        };
        if moved {
            events.push(TradeEvent::VolumeChanged {
                route: route.id,
                old_volume,
                new_volume,
                percent_change: percentage_change(old_volume, new_volume).unwrap_or(100.0),
                reason: reason.to_string(),
                at: now,
            });
        }
        (route, events)
    }

    fn record_batch(&self, report: &BatchReport) {
        let warn_after = Duration::from_millis(self.config.scheduler.performance_warning_ms);
        let slow = report.elapsed > warn_after;
        if slow {
            tracing::warn!(
                elapsed_ms = report.elapsed.as_secs_f64() * 1000.0,
                routes = report.processed,
                "route batch exceeded its time budget"
            );
        }
        let mut metrics = self
            .metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        metrics.batches_run += 1;
        metrics.routes_processed += report.processed as u64;
        metrics.commit_conflicts += report.conflicts as u64;
        metrics.last_batch = report.elapsed;
        metrics.peak_batch = metrics.peak_batch.max(report.elapsed);
        if slow {
            metrics.slow_batches += 1;
        }
    }

    // -----------------------------------------------------------------------
    // Monthly passes
    // -----------------------------------------------------------------------

    /// Net route flows per market: exports draw down the exporter, imports add to the
    /// importer.
    fn market_flows(&self) -> MarketFlows {
        let tables = self.lock_tables();
        let mut flows = MarketFlows::new();
        for route in tables.routes.values() {
            let volume = effective_volume(route);
            if volume <= 0.0 {
                continue;
            }
            *flows.entry((route.source, route.resource)).or_default() -= volume;
            *flows.entry((route.destination, route.resource)).or_default() += volume;
        }
        flows
    }

    /// One market-cadence update of every known market.
    pub fn tick_markets(&self, rng: &mut impl Rng) {
        let now = self.clock.now();
        let flows = self.market_flows();
        let events = self.lock_markets().tick(&flows, now, rng);
        self.publish_all(events);
    }

    /// Random disruptions of exposed routes; riskier routes are hit more often.
    pub fn roll_route_hazards(&self, rng: &mut impl Rng) -> Vec<RouteId> {
        let chance = self.config.scheduler.hazard_chance;
        let exposed: Vec<(RouteId, f64)> = self
            .lock_tables()
            .routes
            .values()
            .filter(|r| r.status == RouteStatus::Active && !r.is_recovering)
            .map(|r| (r.id, r.safety_rating))
            .collect();

        let mut hit = Vec::new();
        for (id, safety) in exposed {
            if rng.random_range(0.0..1.0) >= chance * (1.0 - safety) {
                continue;
            }
            match self.disrupt_route(id, "bandit activity", self.config.scheduler.hazard_duration_months) {
                Ok(_) => hit.push(id),
                Err(e) => tracing::debug!(route = %id, error = %e, "hazard skipped"),
            }
        }
        hit
    }

    /// Refresh hub statistics, promote outgrown hubs, and designate new local markets.
    pub fn refresh_hubs(&self) {
        let now = self.clock.now();
        let events = {
            let mut tables = self.lock_tables();
            let tables = &mut *tables;
            tables.hubs.refresh(&tables.routes);
            let mut events = tables.hubs.evolve(&tables.routes, now);
            events.extend(tables.hubs.auto_designate(&tables.ledgers, self.finder.graph(), now));
            if !events.is_empty() {
                tables.hubs.refresh(&tables.routes);
            }
            events
        };
        self.publish_all(events);
    }

    /// Abandon active routes whose profitability has fallen to the abandonment threshold.
    pub fn prune_unprofitable_routes(&self) -> Vec<RouteId> {
        let threshold = self.config.abandon_profitability_threshold;
        let doomed: Vec<RouteId> = self
            .lock_tables()
            .routes
            .values()
            .filter(|r| r.status == RouteStatus::Active && !r.is_recovering)
            .filter(|r| r.profitability() <= threshold)
            .map(|r| r.id)
            .collect();

        doomed
            .into_iter()
            .filter(|id| match self.abandon_with_reason(*id, "unprofitable") {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(route = %id, error = %e, "prune skipped");
                    false
                }
            })
            .collect()
    }

    /// Refresh one route's prices and seasonal modifier now, outside the batch cycle.
    pub fn reprice_route(&self, id: RouteId) -> Result<(), TradeError> {
        let now = self.clock.now();
        let mut route = self.route_snapshot(id)?;
        let (source_price, destination_price) = {
            let mut markets = self.lock_markets();
            let regions = self.regions.as_ref();
            (
                markets.price(route.source, route.resource, regions, now),
                markets.price(route.destination, route.resource, regions, now),
            )
        };
        route.source_price = source_price;
        route.destination_price = destination_price;
        route.seasonal_modifier = seasonal_route_modifier(route.kind, now.month());
        recalculate_profit_metrics(&mut route);
        self.commit_route(route)
    }
}
