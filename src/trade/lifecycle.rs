//! The trade engine: canonical route table, hub registry, ledgers, and the
//! establish / disrupt / recover / abandon state machine.
//!
//! Locking discipline: path search, pricing and arithmetic happen on copies with no
//! table lock held. Only the final insert, replace or remove takes the `tables` lock,
//! and it re-checks what the compute phase assumed (id still free, revision
//! unchanged). Events are published after the lock is released. The engine never
//! holds the `tables` and `markets` locks at the same time.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::calculator::{
    MIN_ROUTE_SAFETY, RevenueImpact, distance_safety, lerp, optimal_volume, recalculate_profit_metrics,
    resolve_route_kind, revenue_impact, route_efficiency, seasonal_route_modifier, transport_cost,
};
use super::collaborators::{RegionDirectory, TimeSource, TradeEventSink};
use super::config::{ConfigError, RecoveryConfig, TradeConfig};
use super::error::{TradeError, ValidationError};
use super::events::TradeEvent;
use super::hubs::HubRegistry;
use super::market::MarketEngine;
use super::pathfinding::RouteFinder;
use crate::ecs::time::SimTime;
use crate::model::{
    Disruption, HubKind, ProvinceTradeLedger, RegionGraph, RegionId, Resource, RouteId, RouteKind,
    RouteStatus, TradeRoute,
};

/// Disrupting an already-disrupted route with this cause extends the disruption.
pub const RENEWAL_CAUSE: &str = "renewal";

const DISRUPTED_VOLUME_FACTOR: f64 = 0.1;
const DISRUPTED_SAFETY_FACTOR: f64 = 0.3;

/// Payload of a successful establish.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstablishedRoute {
    pub route_id: RouteId,
    pub kind: RouteKind,
    pub profitability: f64,
    pub expected_monthly_profit: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineMetrics {
    pub batches_run: u64,
    pub routes_processed: u64,
    pub commit_conflicts: u64,
    pub slow_batches: u64,
    pub last_batch: Duration,
    pub peak_batch: Duration,
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Everything guarded by the table lock. Ledgers hold route ids only.
#[derive(Debug, Default)]
pub(super) struct TradeTables {
    pub(super) routes: BTreeMap<RouteId, TradeRoute>,
    pub(super) hubs: HubRegistry,
    pub(super) ledgers: BTreeMap<RegionId, ProvinceTradeLedger>,
    pub(super) batch_cursor: Option<RouteId>,
}

impl TradeTables {
    pub(super) fn index_route(&mut self, route: &TradeRoute) {
        for region in &route.path {
            self.ledgers
                .entry(*region)
                .or_insert_with(|| ProvinceTradeLedger::new(*region))
                .attach(route.id, route.waypoints());
        }
        self.hubs.attach_route(&route.id);
    }

    fn unindex_route(&mut self, route: &TradeRoute) {
        for region in &route.path {
            if let Some(ledger) = self.ledgers.get_mut(region) {
                ledger.detach(&route.id);
                if ledger.is_empty() {
                    self.ledgers.remove(region);
                }
            }
        }
        self.hubs.detach_route(&route.id);
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct TradeEngine {
    pub(super) config: TradeConfig,
    pub(super) regions: Arc<dyn RegionDirectory>,
    pub(super) clock: Arc<dyn TimeSource>,
    pub(super) events: Arc<dyn TradeEventSink>,
    pub(super) finder: RouteFinder,
    pub(super) markets: Mutex<MarketEngine>,
    pub(super) tables: Mutex<TradeTables>,
    pub(super) metrics: Mutex<EngineMetrics>,
}

impl TradeEngine {
    pub fn new(
        config: TradeConfig,
        graph: RegionGraph,
        regions: Arc<dyn RegionDirectory>,
        clock: Arc<dyn TimeSource>,
        events: Arc<dyn TradeEventSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            finder: RouteFinder::new(Arc::new(graph), config.pathfinding.clone()),
            markets: Mutex::new(MarketEngine::new(config.market.clone())),
            tables: Mutex::new(TradeTables {
                hubs: HubRegistry::new(config.hubs.clone()),
                ..TradeTables::default()
            }),
            metrics: Mutex::new(EngineMetrics::default()),
            config,
            regions,
            clock,
            events,
        })
    }

    pub fn config(&self) -> &TradeConfig {
        &self.config
    }

    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    pub fn graph(&self) -> &RegionGraph {
        self.finder.graph()
    }

    pub(super) fn lock_tables(&self) -> MutexGuard<'_, TradeTables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn lock_markets(&self) -> MutexGuard<'_, MarketEngine> {
        self.markets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn publish_all(&self, events: impl IntoIterator<Item = TradeEvent>) {
        for event in events {
            self.events.publish(event);
        }
    }

    /// Copy of a route taken under a short lock, for the compute phase.
    pub(super) fn route_snapshot(&self, id: RouteId) -> Result<TradeRoute, TradeError> {
        self.lock_tables()
            .routes
            .get(&id)
            .cloned()
            .ok_or(TradeError::RouteNotFound(id))
    }

    /// Replace a route computed from a snapshot, if nobody committed in between.
    pub(super) fn commit_route(&self, mut route: TradeRoute) -> Result<(), TradeError> {
        let mut tables = self.lock_tables();
        let current = tables
            .routes
            .get_mut(&route.id)
            .ok_or(TradeError::RouteNotFound(route.id))?;
        if current.revision != route.revision {
            return Err(TradeError::Conflict {
                route: route.id,
                expected: route.revision,
                found: current.revision,
            });
        }
        route.revision += 1;
        *current = route;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Establish
    // -----------------------------------------------------------------------

    fn validate_endpoints(
        &self,
        source: RegionId,
        destination: RegionId,
        resource: Resource,
    ) -> Result<(), ValidationError> {
        if source == destination {
            return Err(ValidationError::SameRegion(source));
        }
        for region in [source, destination] {
            if !self.regions.region_exists(region) {
                return Err(ValidationError::UnknownRegion(region));
            }
        }
        if !self.regions.can_produce(source, resource) {
            return Err(ValidationError::CannotProduce {
                region: source,
                resource,
            });
        }
        if !self.regions.can_receive(destination, resource) {
            return Err(ValidationError::CannotReceive {
                region: destination,
                resource,
            });
        }
        Ok(())
    }

    /// Open a new route between two regions.
    ///
    /// Fails with `RouteExists` if the logical route is already open, including when a
    /// concurrent call for the same route commits first.
    pub fn establish_route(
        &self,
        source: RegionId,
        destination: RegionId,
        resource: Resource,
        preferred_kind: RouteKind,
    ) -> Result<EstablishedRoute, TradeError> {
        self.validate_endpoints(source, destination, resource)?;
        let id = RouteId::new(source, destination, resource);
        if self.lock_tables().routes.contains_key(&id) {
            return Err(TradeError::RouteExists(id));
        }

        let now = self.clock.now();
        let route = self.build_route(id, preferred_kind, now)?;

        {
            let mut tables = self.lock_tables();
            if tables.routes.contains_key(&id) {
                return Err(TradeError::RouteExists(id));
            }
            tables.index_route(&route);
            tables.routes.insert(id, route.clone());
            // Congestion follows the table under the same lock (tables, then congestion).
            self.finder.record_route(&route.path);
        }

        tracing::info!(
            route = %id,
            kind = %route.kind,
            distance_km = route.distance_km,
            profitability = route.profitability(),
            "route established"
        );
        self.events.publish(TradeEvent::RouteEstablished {
            route: id,
            kind: route.kind,
            distance_km: route.distance_km,
            profitability: route.profitability(),
            expected_monthly_profit: route.expected_monthly_profit(),
            at: now,
        });

        Ok(EstablishedRoute {
            route_id: id,
            kind: route.kind,
            profitability: route.profitability(),
            expected_monthly_profit: route.expected_monthly_profit(),
        })
    }

    /// Compute every field of a new route. Takes no table lock.
    fn build_route(
        &self,
        id: RouteId,
        preferred_kind: RouteKind,
        now: SimTime,
    ) -> Result<TradeRoute, TradeError> {
        let search = self
            .finder
            .find(id.source, id.destination, id.resource)
            .ok_or(ValidationError::NoViablePath {
                from: id.source,
                to: id.destination,
            })?;
        let best = &search.best;
        let good = id.resource.properties();

        let kind = resolve_route_kind(preferred_kind, best.features, best.distance_km);
        let efficiency = route_efficiency(best.features);
        let transport = transport_cost(
            best.distance_km,
            good.bulk_factor,
            good.perishability,
            efficiency,
            kind,
        )
        .ok_or(ValidationError::InvalidEfficiency(efficiency))?;
        let safety = distance_safety(best.safety, best.distance_km).unwrap_or(MIN_ROUTE_SAFETY);

        let (source_price, destination_price, supply, demand) = {
            let mut markets = self.lock_markets();
            let regions = self.regions.as_ref();
            let src = markets.ensure(id.source, id.resource, regions, now);
            let (source_price, supply) = (src.current_price, src.supply);
            let dst = markets.ensure(id.destination, id.resource, regions, now);
            (source_price, dst.current_price, supply, dst.demand)
        };
        if source_price <= 0.0 {
            return Err(ValidationError::NoPrice {
                region: id.source,
                resource: id.resource,
            }
            .into());
        }
        let volume = optimal_volume(
            supply,
            demand,
            self.config.volume_scale,
            self.config.max_route_volume,
        );

        let mut route = TradeRoute {
            id,
            source: id.source,
            destination: id.destination,
            resource: id.resource,
            kind,
            status: RouteStatus::Establishing,
            path: best.path.clone(),
            features: best.features,
            distance_km: best.distance_km,
            safety_rating: safety,
            efficiency_rating: efficiency,
            seasonal_modifier: seasonal_route_modifier(kind, now.month()),
            base_volume: volume,
            current_volume: volume,
            source_price,
            destination_price,
            transport_cost_per_unit: transport,
            profit: Default::default(),
            disruption: None,
            is_recovering: false,
            recovery_progress: 0.0,
            disruption_count: 0,
            total_goods_moved: 0.0,
            lifetime_profit: 0.0,
            established_at: now,
            last_processed: now,
            revision: 0,
        };
        route.status = RouteStatus::Active;
        recalculate_profit_metrics(&mut route);

        if route.profitability() < self.config.min_viable_profitability {
            tracing::debug!(route = %id, profitability = route.profitability(), "rejected as unprofitable");
            return Err(ValidationError::Unprofitable {
                profitability: route.profitability(),
                threshold: self.config.min_viable_profitability,
            }
            .into());
        }
        if route.safety_rating < self.config.min_viable_safety {
            tracing::debug!(route = %id, safety = route.safety_rating, "rejected as unsafe");
            return Err(ValidationError::Unsafe {
                safety: route.safety_rating,
                threshold: self.config.min_viable_safety,
            }
            .into());
        }
        Ok(route)
    }

    // -----------------------------------------------------------------------
    // Disrupt / recover
    // -----------------------------------------------------------------------

    /// Disrupt a route for `duration_months`.
    ///
    /// An active route drops to 10% volume and 30% safety of its baseline. A route that
    /// is already disrupted only accepts the `"renewal"` cause, which extends the
    /// disruption without reducing anything a second time.
    pub fn disrupt_route(
        &self,
        id: RouteId,
        cause: &str,
        duration_months: f64,
    ) -> Result<RevenueImpact, TradeError> {
        if !(duration_months.is_finite() && duration_months > 0.0) {
            return Err(ValidationError::InvalidDuration(duration_months).into());
        }
        let now = self.clock.now();
        let before = self.route_snapshot(id)?;
        let mut after = before.clone();

        let renewal = match before.status {
            RouteStatus::Active => {
                apply_disruption(&mut after, cause, duration_months, now, &self.config.recovery);
                false
            }
            RouteStatus::Disrupted if cause == RENEWAL_CAUSE => {
                if let Some(disruption) = after.disruption.as_mut() {
                    disruption.duration_months += duration_months;
                }
                true
            }
            RouteStatus::Disrupted => {
                return Err(TradeError::AlreadyDisrupted {
                    route: id,
                    cause: cause.to_string(),
                });
            }
            status => {
                return Err(TradeError::InvalidState {
                    route: id,
                    status,
                    operation: "disrupt",
                });
            }
        };
        recalculate_profit_metrics(&mut after);
        let impact = revenue_impact(&before, &after);

        self.commit_route(after)?;

        tracing::info!(route = %id, cause, duration_months, renewal, "route disrupted");
        self.events.publish(TradeEvent::RouteDisrupted {
            route: id,
            cause: cause.to_string(),
            duration_months,
            renewal,
            impact,
            at: now,
        });
        Ok(impact)
    }

    /// End a disruption now; the route starts recovering toward its baseline.
    pub fn recover_route(&self, id: RouteId) -> Result<(), TradeError> {
        let now = self.clock.now();
        let mut route = self.route_snapshot(id)?;
        if route.status != RouteStatus::Disrupted {
            return Err(TradeError::InvalidState {
                route: id,
                status: route.status,
                operation: "recover",
            });
        }
        if let Some(disruption) = route.disruption.as_mut() {
            disruption.duration_months = now.fractional_months_since(disruption.started_at);
        }
        let mut events = Vec::new();
        progress_recovery(&mut route, now, &mut events);
        recalculate_profit_metrics(&mut route);
        self.commit_route(route)?;
        self.publish_all(events);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Abandon
    // -----------------------------------------------------------------------

    /// Remove a route for good, detaching it from ledgers and hubs.
    pub fn abandon_route(&self, id: RouteId) -> Result<(), TradeError> {
        self.abandon_with_reason(id, "abandoned")
    }

    pub(super) fn abandon_with_reason(&self, id: RouteId, reason: &str) -> Result<(), TradeError> {
        let now = self.clock.now();
        let route = {
            let mut tables = self.lock_tables();
            let route = tables
                .routes
                .remove(&id)
                .ok_or(TradeError::RouteNotFound(id))?;
            tables.unindex_route(&route);
            if tables.batch_cursor == Some(id) {
                tables.batch_cursor = tables.routes.range(..id).next_back().map(|(k, _)| *k);
            }
            self.finder.release_route(&route.path);
            route
        };

        tracing::info!(route = %id, reason, "route abandoned");
        self.events.publish(TradeEvent::RouteAbandoned {
            route: id,
            reason: reason.to_string(),
            lifetime_profit: route.lifetime_profit,
            total_goods_moved: route.total_goods_moved,
            at: now,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Hubs and markets
    // -----------------------------------------------------------------------

    pub fn create_hub(&self, region: RegionId, name: &str, kind: HubKind) -> Result<(), TradeError> {
        if !self.regions.region_exists(region) {
            return Err(TradeError::RegionNotFound(region));
        }
        let now = self.clock.now();
        let event = {
            let mut tables = self.lock_tables();
            let existing: Vec<RouteId> = tables
                .ledgers
                .get(&region)
                .map(|l| l.endpoint_routes().copied().collect())
                .unwrap_or_default();
            tables.hubs.create_hub(region, name, kind, &existing, now)?
        };
        self.events.publish(event);
        Ok(())
    }

    pub fn upgrade_hub(&self, region: RegionId, new_level: u8) -> Result<(), TradeError> {
        let now = self.clock.now();
        let event = self.lock_tables().hubs.upgrade_hub(region, new_level, now)?;
        self.events.publish(event);
        Ok(())
    }

    pub fn apply_price_shock(
        &self,
        region: RegionId,
        resource: Resource,
        magnitude: f64,
        cause: &str,
    ) -> Result<(), TradeError> {
        if !self.regions.region_exists(region) {
            return Err(TradeError::RegionNotFound(region));
        }
        let now = self.clock.now();
        let event = self.lock_markets().apply_price_shock(
            region,
            resource,
            magnitude,
            cause,
            self.regions.as_ref(),
            now,
        )?;
        self.events.publish(event);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Route transitions (pure)
// ---------------------------------------------------------------------------

fn recovery_months(config: &RecoveryConfig, duration_months: f64) -> f64 {
    (duration_months * config.months_per_disruption_month)
        .clamp(config.min_recovery_months, config.max_recovery_months)
}

/// Active → Disrupted. The volume and safety in force now become the baseline, even
/// for a route that is still recovering from an earlier disruption.
fn apply_disruption(
    route: &mut TradeRoute,
    cause: &str,
    duration_months: f64,
    now: SimTime,
    config: &RecoveryConfig,
) {
    let baseline_volume = route.current_volume;
    let baseline_safety = route.safety_rating;
    route.disruption = Some(Disruption {
        cause: cause.to_string(),
        started_at: now,
        duration_months,
        recovery_months: recovery_months(config, duration_months),
        baseline_volume,
        baseline_safety,
    });
    route.current_volume = baseline_volume * DISRUPTED_VOLUME_FACTOR;
    route.safety_rating = baseline_safety * DISRUPTED_SAFETY_FACTOR;
    route.status = RouteStatus::Disrupted;
    route.is_recovering = false;
    route.recovery_progress = 0.0;
    route.disruption_count += 1;
}

/// Move a disrupted or recovering route along its recovery curve for time `now`.
///
/// Progress is derived from absolute times, so it does not matter how often this runs.
/// Returns true if anything changed.
pub(super) fn progress_recovery(
    route: &mut TradeRoute,
    now: SimTime,
    events: &mut Vec<TradeEvent>,
) -> bool {
    let Some(disruption) = route.disruption.clone() else {
        return false;
    };
    let recovery_start = disruption.started_at.plus_months(disruption.duration_months);
    let mut changed = false;

    if route.status == RouteStatus::Disrupted && now >= recovery_start {
        route.status = RouteStatus::Active;
        route.is_recovering = true;
        route.recovery_progress = 0.0;
        changed = true;
        tracing::info!(route = %route.id, recovery_months = disruption.recovery_months, "recovery started");
        events.push(TradeEvent::RouteRecoveryStarted {
            route: route.id,
            recovery_months: disruption.recovery_months,
            at: now,
        });
    }
    if !route.is_recovering {
        return changed;
    }

    let progress = if disruption.recovery_months > 0.0 {
        now.fractional_months_since(recovery_start) / disruption.recovery_months
    } else {
        1.0
    };
    if progress >= 1.0 {
        route.current_volume = disruption.baseline_volume;
        route.safety_rating = disruption.baseline_safety;
        route.recovery_progress = 1.0;
        route.is_recovering = false;
        route.disruption = None;
        tracing::info!(route = %route.id, "recovery complete");
        events.push(TradeEvent::RouteRecoveryComplete {
            route: route.id,
            restored_volume: route.current_volume,
            restored_safety: route.safety_rating,
            at: now,
        });
        return true;
    }

    let floor_volume = disruption.baseline_volume * DISRUPTED_VOLUME_FACTOR;
    let floor_safety = disruption.baseline_safety * DISRUPTED_SAFETY_FACTOR;
    route.recovery_progress = progress;
    route.current_volume = lerp(floor_volume, disruption.baseline_volume, progress);
    route.safety_rating = lerp(floor_safety, disruption.baseline_safety, progress);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PathFeatures, ProfitMetrics};

    fn active_route() -> TradeRoute {
        let id = RouteId::new(RegionId(1), RegionId(3), Resource::Grain);
        let mut route = TradeRoute {
            id,
            source: id.source,
            destination: id.destination,
            resource: id.resource,
            kind: RouteKind::Land,
            status: RouteStatus::Active,
            path: vec![RegionId(1), RegionId(2), RegionId(3)],
            features: PathFeatures::default(),
            distance_km: 200.0,
            safety_rating: 0.8,
            efficiency_rating: 0.85,
            seasonal_modifier: 1.0,
            base_volume: 120.0,
            current_volume: 120.0,
            source_price: 8.0,
            destination_price: 20.0,
            transport_cost_per_unit: 3.0,
            profit: ProfitMetrics::default(),
            disruption: None,
            is_recovering: false,
            recovery_progress: 0.0,
            disruption_count: 0,
            total_goods_moved: 0.0,
            lifetime_profit: 0.0,
            established_at: SimTime::default(),
            last_processed: SimTime::default(),
            revision: 0,
        };
        recalculate_profit_metrics(&mut route);
        route
    }

    #[test]
    fn disruption_scales_from_baseline() {
        let mut route = active_route();
        apply_disruption(&mut route, "raid", 6.0, SimTime::default(), &RecoveryConfig::default());
        assert_eq!(route.status, RouteStatus::Disrupted);
        assert!((route.current_volume - 12.0).abs() < 1e-12);
        assert!((route.safety_rating - 0.24).abs() < 1e-12);
        assert_eq!(route.disruption_count, 1);
        assert_eq!(route.disruption.as_ref().unwrap().recovery_months, 6.0);
    }

    #[test]
    fn recovery_months_are_clamped() {
        let config = RecoveryConfig::default();
        assert_eq!(recovery_months(&config, 0.25), 1.0);
        assert_eq!(recovery_months(&config, 30.0), 12.0);
    }

    #[test]
    fn recovery_interpolates_then_restores() {
        let start = SimTime::from_year(5);
        let mut route = active_route();
        apply_disruption(&mut route, "raid", 2.0, start, &RecoveryConfig::default());
        let mut events = Vec::new();

        assert!(!progress_recovery(&mut route, start.plus_months(1.0), &mut events));
        assert_eq!(route.status, RouteStatus::Disrupted);

        assert!(progress_recovery(&mut route, start.plus_months(3.0), &mut events));
        assert_eq!(route.status, RouteStatus::Active);
        assert!(route.is_recovering);
        assert!((route.recovery_progress - 0.5).abs() < 1e-9);
        assert!((route.current_volume - 66.0).abs() < 1e-9);

        progress_recovery(&mut route, start.plus_months(4.0), &mut events);
        assert!(!route.is_recovering);
        assert!(route.disruption.is_none());
        assert_eq!(route.current_volume, 120.0);
        assert_eq!(route.safety_rating, 0.8);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn long_idle_gap_completes_in_one_step() {
        let start = SimTime::from_year(5);
        let mut route = active_route();
        apply_disruption(&mut route, "flood", 1.0, start, &RecoveryConfig::default());
        let mut events = Vec::new();
        progress_recovery(&mut route, start.plus_months(24.0), &mut events);
        assert_eq!(route.status, RouteStatus::Active);
        assert!(!route.is_recovering);
        assert!(matches!(events[0], TradeEvent::RouteRecoveryStarted { .. }));
        assert!(matches!(events[1], TradeEvent::RouteRecoveryComplete { .. }));
    }

    #[test]
    fn disruption_during_recovery_cuts_from_current_volume() {
        let start = SimTime::from_year(5);
        let mut route = active_route();
        apply_disruption(&mut route, "raid", 1.0, start, &RecoveryConfig::default());
        progress_recovery(&mut route, start.plus_months(1.5), &mut Vec::new());
        assert!(route.is_recovering);
        let volume = route.current_volume;
        let safety = route.safety_rating;
        assert!(volume < 120.0);

        apply_disruption(&mut route, "raid", 1.0, start.plus_months(1.5), &RecoveryConfig::default());
        let disruption = route.disruption.as_ref().unwrap();
        assert_eq!(disruption.baseline_volume, volume);
        assert_eq!(disruption.baseline_safety, safety);
        assert!((route.current_volume - 0.1 * volume).abs() < 1e-12);
        assert!((route.safety_rating - 0.3 * safety).abs() < 1e-12);
        assert!(!route.is_recovering);
        assert_eq!(route.disruption_count, 2);
    }
}
