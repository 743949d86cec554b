use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::region::RegionId;
use super::resource::Resource;
use crate::ecs::time::SimTime;

// ---------------------------------------------------------------------------
// Route kind and status
// ---------------------------------------------------------------------------

/// Transport medium of a route; drives base cost, speed and seasonality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RouteKind {
    Land,
    River,
    Coastal,
    Sea,
    LongOverland,
}

string_enum!(RouteKind {
    Land => "land",
    River => "river",
    Coastal => "coastal",
    Sea => "sea",
    LongOverland => "long_overland",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RouteStatus {
    Establishing,
    Active,
    SeasonallyClosed,
    Disrupted,
    Abandoned,
}

string_enum!(RouteStatus {
    Establishing => "establishing",
    Active => "active",
    SeasonallyClosed => "seasonally_closed",
    Disrupted => "disrupted",
    Abandoned => "abandoned",
});

impl RouteStatus {
    pub fn is_terminal(self) -> bool {
        self == RouteStatus::Abandoned
    }

    /// Whether goods flow at all in this state (a disrupted route still trickles).
    pub fn carries_goods(self) -> bool {
        matches!(self, RouteStatus::Active | RouteStatus::Disrupted)
    }
}

// ---------------------------------------------------------------------------
// Route id
// ---------------------------------------------------------------------------

/// Route identity, derived from the logical route `(source, destination, resource)`.
///
/// Renders as `route_{source}_{destination}_{resource}` and serializes as that string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RouteId {
    pub source: RegionId,
    pub destination: RegionId,
    pub resource: Resource,
}

impl RouteId {
    pub fn new(source: RegionId, destination: RegionId, resource: Resource) -> Self {
        Self {
            source,
            destination,
            resource,
        }
    }

    /// The region at the other end of the route, if `region` is an endpoint.
    pub fn partner_of(&self, region: RegionId) -> Option<RegionId> {
        if region == self.source {
            Some(self.destination)
        } else if region == self.destination {
            Some(self.source)
        } else {
            None
        }
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "route_{}_{}_{}",
            self.source, self.destination, self.resource
        )
    }
}

impl FromStr for RouteId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(4, '_');
        let (Some("route"), Some(source), Some(destination), Some(resource)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("malformed route id: {s}"));
        };
        let source = source
            .parse::<u64>()
            .map_err(|e| format!("bad source in {s}: {e}"))?;
        let destination = destination
            .parse::<u64>()
            .map_err(|e| format!("bad destination in {s}: {e}"))?;
        Ok(Self::new(
            RegionId(source),
            RegionId(destination),
            resource.parse()?,
        ))
    }
}

impl From<RouteId> for String {
    fn from(id: RouteId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for RouteId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ---------------------------------------------------------------------------
// Path features
// ---------------------------------------------------------------------------

/// Terrain features crossed by a route's path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathFeatures {
    pub coastal: bool,
    pub river: bool,
    pub mountain_pass: bool,
}

// ---------------------------------------------------------------------------
// Profit metrics
// ---------------------------------------------------------------------------

/// Derived profit figures. `profit_per_unit` is authoritative; the other two are
/// always derived from it together with the route's prices and effective volume.
///
/// Only `trade::calculator::recalculate_profit_metrics` builds these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfitMetrics {
    profit_per_unit: f64,
    profitability: f64,
    expected_monthly_profit: f64,
}

impl ProfitMetrics {
    pub(crate) fn derive(profit_per_unit: f64, source_price: f64, effective_volume: f64) -> Self {
        let profitability = if source_price > 0.0 {
            (profit_per_unit / source_price).max(0.0)
        } else {
            0.0
        };
        Self {
            profit_per_unit,
            profitability,
            expected_monthly_profit: profit_per_unit * effective_volume,
        }
    }

    pub fn profit_per_unit(&self) -> f64 {
        self.profit_per_unit
    }

    pub fn profitability(&self) -> f64 {
        self.profitability
    }

    pub fn expected_monthly_profit(&self) -> f64 {
        self.expected_monthly_profit
    }
}

// ---------------------------------------------------------------------------
// Disruption bookkeeping
// ---------------------------------------------------------------------------

/// An ongoing disruption and the baseline the route recovers toward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disruption {
    pub cause: String,
    pub started_at: SimTime,
    pub duration_months: f64,
    pub recovery_months: f64,
    pub baseline_volume: f64,
    pub baseline_safety: f64,
}

// ---------------------------------------------------------------------------
// Trade route
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRoute {
    pub id: RouteId,
    pub source: RegionId,
    pub destination: RegionId,
    pub resource: Resource,
    pub kind: RouteKind,
    pub status: RouteStatus,
    /// Full path including both endpoints.
    pub path: Vec<RegionId>,
    pub features: PathFeatures,
    pub distance_km: f64,
    pub safety_rating: f64,
    pub efficiency_rating: f64,
    pub seasonal_modifier: f64,
    pub base_volume: f64,
    pub current_volume: f64,
    pub source_price: f64,
    pub destination_price: f64,
    pub transport_cost_per_unit: f64,
    pub(crate) profit: ProfitMetrics,
    pub disruption: Option<Disruption>,
    pub is_recovering: bool,
    pub recovery_progress: f64,
    pub disruption_count: u32,
    pub total_goods_moved: f64,
    pub lifetime_profit: f64,
    pub established_at: SimTime,
    pub last_processed: SimTime,
    /// Bumped on every committed change; used to detect lost races at commit time.
    pub revision: u64,
}

impl TradeRoute {
    pub fn profit(&self) -> &ProfitMetrics {
        &self.profit
    }

    pub fn profit_per_unit(&self) -> f64 {
        self.profit.profit_per_unit()
    }

    pub fn profitability(&self) -> f64 {
        self.profit.profitability()
    }

    pub fn expected_monthly_profit(&self) -> f64 {
        self.profit.expected_monthly_profit()
    }

    /// Intermediate regions the route passes through.
    pub fn waypoints(&self) -> &[RegionId] {
        match self.path.len() {
            0..=2 => &[],
            n => &self.path[1..n - 1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_id_renders_logical_key() {
        let id = RouteId::new(RegionId(3), RegionId(7), Resource::Grain);
        assert_eq!(id.to_string(), "route_3_7_grain");
    }

    #[test]
    fn route_id_parses_its_rendering() {
        let id = RouteId::new(RegionId(12), RegionId(4), Resource::Spices);
        let parsed: RouteId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("route_x_4_grain".parse::<RouteId>().is_err());
        assert!("path_1_2_grain".parse::<RouteId>().is_err());
    }

    #[test]
    fn partner_of_endpoints() {
        let id = RouteId::new(RegionId(1), RegionId(2), Resource::Iron);
        assert_eq!(id.partner_of(RegionId(1)), Some(RegionId(2)));
        assert_eq!(id.partner_of(RegionId(2)), Some(RegionId(1)));
        assert_eq!(id.partner_of(RegionId(9)), None);
    }

    #[test]
    fn profitability_never_negative() {
        let losing = ProfitMetrics::derive(-4.0, 10.0, 50.0);
        assert_eq!(losing.profitability(), 0.0);
        assert_eq!(losing.expected_monthly_profit(), -200.0);

        let winning = ProfitMetrics::derive(5.0, 10.0, 20.0);
        assert!((winning.profitability() - 0.5).abs() < 1e-12);
        assert!((winning.expected_monthly_profit() - 100.0).abs() < 1e-12);
    }

    #[test]
    fn only_active_and_disrupted_carry_goods() {
        assert!(RouteStatus::Active.carries_goods());
        assert!(RouteStatus::Disrupted.carries_goods());
        assert!(!RouteStatus::SeasonallyClosed.carries_goods());
        assert!(!RouteStatus::Establishing.carries_goods());
        assert!(!RouteStatus::Abandoned.carries_goods());
    }
}
