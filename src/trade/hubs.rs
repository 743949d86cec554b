use std::collections::{BTreeMap, BTreeSet};

use super::calculator::{effective_volume, hub_capacity, hub_infrastructure_bonus, hub_security};
use super::config::HubConfig;
use super::error::{TradeError, ValidationError};
use super::events::TradeEvent;
use crate::ecs::time::SimTime;
use crate::model::{
    HubKind, MAX_HUB_LEVEL, MIN_HUB_LEVEL, ProvinceTradeLedger, RegionGraph, RegionId, Resource,
    RouteId, TradeHub, TradeRoute,
};

// ---------------------------------------------------------------------------
// Constants: Evolution thresholds
// ---------------------------------------------------------------------------

const PORT_VOLUME: f64 = 1000.0;
const PORT_ROUTES: usize = 20;
const MAJOR_VOLUME: f64 = 500.0;
const MAJOR_ROUTES: usize = 10;
const CROSSROADS_ROUTES: usize = 6;
const REGIONAL_VOLUME: f64 = 100.0;
const REGIONAL_ROUTES: usize = 3;

const MAX_UTILIZATION: f64 = 1.5;
const MIN_REPUTATION: f64 = 0.5;
const MAX_REPUTATION: f64 = 2.0;

/// Hubs keyed by region. Capacity, infrastructure and security are always derived
/// from `(kind, level)`; nothing is scaled in place.
#[derive(Debug, Default)]
pub struct HubRegistry {
    config: HubConfig,
    hubs: BTreeMap<RegionId, TradeHub>,
}

impl HubRegistry {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            hubs: BTreeMap::new(),
        }
    }

    pub fn get(&self, region: RegionId) -> Option<&TradeHub> {
        self.hubs.get(&region)
    }

    pub fn hubs(&self) -> impl Iterator<Item = &TradeHub> {
        self.hubs.values()
    }

    pub fn len(&self) -> usize {
        self.hubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.is_empty()
    }

    pub fn restore(&mut self, hubs: impl IntoIterator<Item = TradeHub>) {
        self.hubs = hubs.into_iter().map(|h| (h.region, h)).collect();
    }

    /// Designate a level-1 hub and attach the region's existing endpoint routes.
    pub fn create_hub(
        &mut self,
        region: RegionId,
        name: &str,
        kind: HubKind,
        existing_routes: &[RouteId],
        now: SimTime,
    ) -> Result<TradeEvent, TradeError> {
        self.designate(region, name, kind, existing_routes, "designated", now)
    }

    fn designate(
        &mut self,
        region: RegionId,
        name: &str,
        kind: HubKind,
        existing_routes: &[RouteId],
        trigger: &str,
        now: SimTime,
    ) -> Result<TradeEvent, TradeError> {
        if self.hubs.contains_key(&region) {
            return Err(TradeError::HubExists(region));
        }
        let hub = self.build_hub(region, name, kind, now)?;
        self.hubs.insert(region, hub);
        for route in existing_routes {
            self.attach_route(route);
        }
        tracing::info!(%region, %kind, trigger, "hub created");
        Ok(self.evolved_event(region, None, trigger, now))
    }

    fn build_hub(
        &self,
        region: RegionId,
        name: &str,
        kind: HubKind,
        now: SimTime,
    ) -> Result<TradeHub, TradeError> {
        let level = MIN_HUB_LEVEL;
        let invalid = || ValidationError::InvalidHubLevel(level);
        Ok(TradeHub {
            region,
            name: name.to_string(),
            kind,
            level,
            capacity: hub_capacity(kind, level).ok_or_else(invalid)?,
            current_utilization: 0.0,
            infrastructure_bonus: hub_infrastructure_bonus(level).ok_or_else(invalid)?,
            base_security: self.config.base_security,
            security_rating: hub_security(self.config.base_security, level).ok_or_else(invalid)?,
            reputation: 1.0,
            specialized_resources: BTreeSet::new(),
            outgoing_routes: BTreeSet::new(),
            incoming_routes: BTreeSet::new(),
            trading_partners: BTreeSet::new(),
            established_at: now,
        })
    }

    /// Raise a hub to `new_level`, recomputing every level-derived figure from base.
    pub fn upgrade_hub(
        &mut self,
        region: RegionId,
        new_level: u8,
        now: SimTime,
    ) -> Result<TradeEvent, TradeError> {
        let hub = self
            .hubs
            .get_mut(&region)
            .ok_or(TradeError::HubNotFound(region))?;
        if !(MIN_HUB_LEVEL..=MAX_HUB_LEVEL).contains(&new_level) {
            return Err(ValidationError::InvalidHubLevel(new_level).into());
        }
        if new_level <= hub.level {
            return Err(ValidationError::NotAnUpgrade {
                region,
                current: hub.level,
                requested: new_level,
            }
            .into());
        }
        let invalid = || ValidationError::InvalidHubLevel(new_level);
        let capacity = hub_capacity(hub.kind, new_level).ok_or_else(invalid)?;
        let infrastructure = hub_infrastructure_bonus(new_level).ok_or_else(invalid)?;
        let security = hub_security(hub.base_security, new_level).ok_or_else(invalid)?;

        hub.level = new_level;
        hub.capacity = capacity;
        hub.infrastructure_bonus = infrastructure;
        hub.security_rating = security;
        let kind = hub.kind;

        tracing::info!(%region, level = new_level, capacity, "hub upgraded");
        Ok(self.evolved_event(region, Some(kind), "upgrade", now))
    }

    /// Index a route at whichever of its endpoints has a hub.
    pub fn attach_route(&mut self, route: &RouteId) {
        if let Some(hub) = self.hubs.get_mut(&route.source) {
            hub.outgoing_routes.insert(*route);
            hub.trading_partners.insert(route.destination);
        }
        if let Some(hub) = self.hubs.get_mut(&route.destination) {
            hub.incoming_routes.insert(*route);
            hub.trading_partners.insert(route.source);
        }
    }

    pub fn detach_route(&mut self, route: &RouteId) {
        for region in [route.source, route.destination] {
            if let Some(hub) = self.hubs.get_mut(&region) {
                hub.outgoing_routes.remove(route);
                hub.incoming_routes.remove(route);
                hub.trading_partners = hub
                    .outgoing_routes
                    .iter()
                    .chain(hub.incoming_routes.iter())
                    .filter_map(|id| id.partner_of(region))
                    .collect();
            }
        }
    }

    /// Recompute utilization, specializations and reputation from attached routes.
    pub fn refresh(&mut self, routes: &BTreeMap<RouteId, TradeRoute>) {
        let share = self.config.specialization_share;
        for hub in self.hubs.values_mut() {
            let capacity = hub.effective_capacity();
            let volume = hub_volume(hub, routes);
            hub.current_utilization = if capacity > 0.0 {
                (volume / capacity).clamp(0.0, MAX_UTILIZATION)
            } else {
                0.0
            };

            let mut incoming: BTreeMap<Resource, f64> = BTreeMap::new();
            for route in hub.incoming_routes.iter().filter_map(|id| routes.get(id)) {
                *incoming.entry(route.resource).or_default() += effective_volume(route);
            }
            hub.specialized_resources = incoming
                .into_iter()
                .filter(|(_, v)| *v > capacity * share)
                .map(|(r, _)| r)
                .collect();

            hub.reputation = ((hub.current_utilization.min(2.0)
                + hub.security_rating
                + hub.infrastructure_bonus)
                / 3.0)
                .clamp(MIN_REPUTATION, MAX_REPUTATION);
        }
    }

    /// Promote hubs whose traffic has outgrown their kind. Never demotes.
    pub fn evolve(&mut self, routes: &BTreeMap<RouteId, TradeRoute>, now: SimTime) -> Vec<TradeEvent> {
        let mut promoted = Vec::new();
        for hub in self.hubs.values_mut() {
            let target = target_kind(hub_volume(hub, routes), hub.route_count());
            if target <= hub.kind {
                continue;
            }
            let Some(capacity) = hub_capacity(target, hub.level) else {
                continue;
            };
            tracing::info!(region = %hub.region, from = %hub.kind, to = %target, "hub evolved");
            promoted.push((hub.region, hub.kind));
            hub.kind = target;
            hub.capacity = capacity;
        }
        promoted
            .into_iter()
            .map(|(region, old)| self.evolved_event(region, Some(old), "growth", now))
            .collect()
    }

    /// Designate a local market in every hubless region that has enough endpoint routes.
    pub fn auto_designate(
        &mut self,
        ledgers: &BTreeMap<RegionId, ProvinceTradeLedger>,
        graph: &RegionGraph,
        now: SimTime,
    ) -> Vec<TradeEvent> {
        let threshold = self.config.auto_hub_route_threshold;
        let candidates: Vec<(RegionId, Vec<RouteId>)> = ledgers
            .values()
            .filter(|l| !self.hubs.contains_key(&l.region))
            .filter(|l| l.outgoing.len() + l.incoming.len() >= threshold)
            .map(|l| (l.region, l.endpoint_routes().copied().collect()))
            .collect();

        let mut events = Vec::new();
        for (region, routes) in candidates {
            let name = graph
                .node(region)
                .map_or_else(|| format!("Region {region}"), |n| n.name.clone());
            match self.designate(region, &name, HubKind::LocalMarket, &routes, "route threshold", now) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(%region, error = %e, "auto hub designation failed"),
            }
        }
        events
    }

    fn evolved_event(
        &self,
        region: RegionId,
        old_kind: Option<HubKind>,
        trigger: &str,
        now: SimTime,
    ) -> TradeEvent {
        let hub = &self.hubs[&region];
        TradeEvent::HubEvolved {
            region,
            old_kind,
            new_kind: hub.kind,
            level: hub.level,
            capacity: hub.capacity,
            specializations: hub.specialized_resources.iter().copied().collect(),
            trigger: trigger.to_string(),
            at: now,
        }
    }
}

fn hub_volume(hub: &TradeHub, routes: &BTreeMap<RouteId, TradeRoute>) -> f64 {
    hub.outgoing_routes
        .iter()
        .chain(hub.incoming_routes.iter())
        .filter_map(|id| routes.get(id))
        .map(effective_volume)
        .sum()
}

fn target_kind(volume: f64, routes: usize) -> HubKind {
    if volume > PORT_VOLUME && routes > PORT_ROUTES {
        HubKind::InternationalPort
    } else if volume > MAJOR_VOLUME && routes > MAJOR_ROUTES {
        HubKind::MajorTradingCenter
    } else if routes > CROSSROADS_ROUTES {
        HubKind::Crossroads
    } else if volume > REGIONAL_VOLUME || routes > REGIONAL_ROUTES {
        HubKind::RegionalHub
    } else {
        HubKind::LocalMarket
    }
}
