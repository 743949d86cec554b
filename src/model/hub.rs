use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::region::RegionId;
use super::resource::Resource;
use super::route::RouteId;
use crate::ecs::time::SimTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum HubKind {
    LocalMarket,
    RegionalHub,
    Crossroads,
    MajorTradingCenter,
    InternationalPort,
}

string_enum!(HubKind {
    LocalMarket => "local_market",
    RegionalHub => "regional_hub",
    Crossroads => "crossroads",
    MajorTradingCenter => "major_trading_center",
    InternationalPort => "international_port",
});

pub const MIN_HUB_LEVEL: u8 = 1;
pub const MAX_HUB_LEVEL: u8 = 5;

/// A region promoted to aggregate and redistribute trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeHub {
    pub region: RegionId,
    pub name: String,
    pub kind: HubKind,
    pub level: u8,
    /// Always `hub_capacity(kind, level)`; never scaled in place.
    pub capacity: f64,
    pub current_utilization: f64,
    pub infrastructure_bonus: f64,
    pub base_security: f64,
    pub security_rating: f64,
    pub reputation: f64,
    pub specialized_resources: BTreeSet<Resource>,
    pub outgoing_routes: BTreeSet<RouteId>,
    pub incoming_routes: BTreeSet<RouteId>,
    pub trading_partners: BTreeSet<RegionId>,
    pub established_at: SimTime,
}

impl TradeHub {
    pub fn route_count(&self) -> usize {
        self.outgoing_routes.len() + self.incoming_routes.len()
    }

    /// Capacity after infrastructure and reputation adjustments.
    pub fn effective_capacity(&self) -> f64 {
        self.capacity * self.infrastructure_bonus * (0.5 + 0.5 * self.reputation)
    }

    pub fn can_handle_volume(&self, additional: f64) -> bool {
        let effective = self.effective_capacity();
        effective > 0.0 && self.current_utilization + additional / effective <= 1.0
    }

    pub fn handles_route(&self, route: &RouteId) -> bool {
        self.outgoing_routes.contains(route) || self.incoming_routes.contains(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub(capacity: f64, utilization: f64, reputation: f64) -> TradeHub {
        TradeHub {
            region: RegionId(2),
            name: "Brask Market".to_string(),
            kind: HubKind::LocalMarket,
            level: 1,
            capacity,
            current_utilization: utilization,
            infrastructure_bonus: 1.0,
            base_security: 0.5,
            security_rating: 0.5,
            reputation,
            specialized_resources: BTreeSet::new(),
            outgoing_routes: BTreeSet::new(),
            incoming_routes: BTreeSet::new(),
            trading_partners: BTreeSet::new(),
            established_at: SimTime::default(),
        }
    }

    #[test]
    fn volume_fits_until_effective_capacity_is_spent() {
        // No reputation halves the capacity.
        let h = hub(1000.0, 0.5, 0.0);
        assert_eq!(h.effective_capacity(), 500.0);
        assert!(h.can_handle_volume(250.0));
        assert!(!h.can_handle_volume(250.1));
        assert!(h.can_handle_volume(0.0));
    }

    #[test]
    fn saturated_or_empty_hub_takes_nothing() {
        assert!(!hub(1000.0, 1.2, 1.0).can_handle_volume(0.0));
        assert!(!hub(0.0, 0.0, 1.0).can_handle_volume(1.0));
    }
}
