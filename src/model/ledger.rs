use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::region::RegionId;
use super::route::RouteId;

/// Per-region index of routes touching the region.
///
/// Holds route ids only; route state lives in the engine's route table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvinceTradeLedger {
    pub region: RegionId,
    pub outgoing: BTreeSet<RouteId>,
    pub incoming: BTreeSet<RouteId>,
    /// Routes passing through this region on the way somewhere else.
    pub in_transit: BTreeSet<RouteId>,
    pub trading_partners: BTreeSet<RegionId>,
}

impl ProvinceTradeLedger {
    pub fn new(region: RegionId) -> Self {
        Self {
            region,
            ..Self::default()
        }
    }

    /// Index a route against this region in whichever role applies.
    pub fn attach(&mut self, route: RouteId, waypoints: &[RegionId]) {
        if route.source == self.region {
            self.outgoing.insert(route);
        } else if route.destination == self.region {
            self.incoming.insert(route);
        } else if waypoints.contains(&self.region) {
            self.in_transit.insert(route);
        }
        if let Some(partner) = route.partner_of(self.region) {
            self.trading_partners.insert(partner);
        }
    }

    pub fn detach(&mut self, route: &RouteId) {
        self.outgoing.remove(route);
        self.incoming.remove(route);
        self.in_transit.remove(route);
        self.rebuild_partners();
    }

    /// Endpoint routes (outgoing then incoming).
    pub fn endpoint_routes(&self) -> impl Iterator<Item = &RouteId> {
        self.outgoing.iter().chain(self.incoming.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty() && self.incoming.is_empty() && self.in_transit.is_empty()
    }

    fn rebuild_partners(&mut self) {
        let region = self.region;
        self.trading_partners = self
            .outgoing
            .iter()
            .chain(self.incoming.iter())
            .filter_map(|id| id.partner_of(region))
            .collect();
    }
}
