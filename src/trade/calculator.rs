//! Stateless economic formulas shared by every trade component.
//!
//! Nothing here touches shared state. Out-of-range input yields `None` rather than a
//! panic or a NaN, so callers decide how to report it.

use serde::{Deserialize, Serialize};

use crate::model::{
    HubKind, MAX_HUB_LEVEL, MIN_HUB_LEVEL, PathFeatures, ProfitMetrics, RouteKind, TradeGood,
    TradeRoute,
};

// ---------------------------------------------------------------------------
// Constants: Transport
// ---------------------------------------------------------------------------

const BASE_COST_PER_KM: f64 = 0.01;
const PERISHABILITY_REFERENCE_KM: f64 = 1000.0;
/// Land routes longer than this are treated as long-overland caravans.
pub const LONG_OVERLAND_KM: f64 = 800.0;

// ---------------------------------------------------------------------------
// Constants: Efficiency and safety
// ---------------------------------------------------------------------------

const BASE_EFFICIENCY: f64 = 0.7;
const COASTAL_EFFICIENCY_BONUS: f64 = 0.15;
const RIVER_EFFICIENCY_BONUS: f64 = 0.15;
const MOUNTAIN_EFFICIENCY_PENALTY: f64 = 0.2;
const MAX_DISTANCE_SAFETY_PENALTY: f64 = 0.3;
const SAFETY_PENALTY_REFERENCE_KM: f64 = 2000.0;
pub const MIN_ROUTE_SAFETY: f64 = 0.1;

// ---------------------------------------------------------------------------
// Constants: Prices
// ---------------------------------------------------------------------------

const MIN_MARKET_LEVEL: f64 = 0.01;
const MIN_PRICE_RATIO: f64 = 0.2;
const MAX_PRICE_RATIO: f64 = 5.0;

// ---------------------------------------------------------------------------
// Constants: Hubs
// ---------------------------------------------------------------------------

const HUB_CAPACITY_STEP: f64 = 0.25;
const HUB_INFRASTRUCTURE_STEP: f64 = 0.15;
const HUB_SECURITY_STEP: f64 = 0.1;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

fn kind_cost_modifier(kind: RouteKind) -> f64 {
    match kind {
        RouteKind::Land => 1.0,
        RouteKind::River => 0.7,
        RouteKind::Coastal => 0.5,
        RouteKind::Sea => 0.3,
        RouteKind::LongOverland => 1.5,
    }
}

pub fn base_cost_per_km(kind: RouteKind) -> f64 {
    BASE_COST_PER_KM * kind_cost_modifier(kind)
}

/// Kilometres covered per day.
pub fn travel_speed(kind: RouteKind) -> f64 {
    match kind {
        RouteKind::Land => 50.0,
        RouteKind::River => 70.0,
        RouteKind::Coastal => 80.0,
        RouteKind::Sea => 100.0,
        RouteKind::LongOverland => 30.0,
    }
}

pub fn travel_days(distance_km: f64, kind: RouteKind) -> Option<f64> {
    if !distance_km.is_finite() || distance_km < 0.0 {
        return None;
    }
    Some(distance_km / travel_speed(kind))
}

/// Cost of moving one unit over `distance_km`.
///
/// `distance × base_cost_per_km(kind) × bulk`, inflated by perishability in proportion
/// to distance, divided by efficiency. Efficiency must be in (0, 1].
pub fn transport_cost(
    distance_km: f64,
    bulk_factor: f64,
    perishability: f64,
    efficiency: f64,
    kind: RouteKind,
) -> Option<f64> {
    if !distance_km.is_finite() || distance_km < 0.0 {
        return None;
    }
    if !(efficiency > 0.0 && efficiency <= 1.0) || bulk_factor < 0.0 || perishability < 0.0 {
        return None;
    }
    let carriage = distance_km * base_cost_per_km(kind) * bulk_factor;
    let spoilage = 1.0 + perishability * distance_km / PERISHABILITY_REFERENCE_KM;
    Some(carriage * spoilage / efficiency)
}

/// Additive feature bonuses and penalties on a base efficiency, clamped to [0, 1].
pub fn route_efficiency(features: PathFeatures) -> f64 {
    let mut efficiency = BASE_EFFICIENCY;
    if features.coastal {
        efficiency += COASTAL_EFFICIENCY_BONUS;
    }
    if features.river {
        efficiency += RIVER_EFFICIENCY_BONUS;
    }
    if features.mountain_pass {
        efficiency -= MOUNTAIN_EFFICIENCY_PENALTY;
    }
    efficiency.clamp(0.0, 1.0)
}

/// Safety lost to sheer distance, on top of a path's base safety.
pub fn distance_safety(base_safety: f64, distance_km: f64) -> Option<f64> {
    if !distance_km.is_finite() || distance_km < 0.0 || !base_safety.is_finite() {
        return None;
    }
    let penalty = (distance_km / SAFETY_PENALTY_REFERENCE_KM).min(MAX_DISTANCE_SAFETY_PENALTY);
    Some((base_safety - penalty).clamp(MIN_ROUTE_SAFETY, 1.0))
}

/// Whether a path can carry a route of this kind.
pub fn kind_supported(kind: RouteKind, features: PathFeatures) -> bool {
    match kind {
        RouteKind::Sea | RouteKind::Coastal => features.coastal,
        RouteKind::River => features.river,
        RouteKind::Land | RouteKind::LongOverland => true,
    }
}

/// Cheapest kind a path supports: coastal, then river, then overland by distance.
pub fn optimal_route_kind(features: PathFeatures, distance_km: f64) -> RouteKind {
    if features.coastal {
        RouteKind::Coastal
    } else if features.river {
        RouteKind::River
    } else if distance_km > LONG_OVERLAND_KM {
        RouteKind::LongOverland
    } else {
        RouteKind::Land
    }
}

/// Keep the caller's preferred kind when the path supports it.
pub fn resolve_route_kind(
    preferred: RouteKind,
    features: PathFeatures,
    distance_km: f64,
) -> RouteKind {
    match preferred {
        RouteKind::Land if distance_km > LONG_OVERLAND_KM => RouteKind::LongOverland,
        kind if kind_supported(kind, features) => kind,
        _ => optimal_route_kind(features, distance_km),
    }
}

/// Throughput multiplier for the month (1–12).
pub fn seasonal_route_modifier(kind: RouteKind, month: u32) -> f64 {
    let winter = matches!(month, 12 | 1 | 2);
    match kind {
        RouteKind::Land if winter => 0.85,
        RouteKind::Land if matches!(month, 3 | 4) => 0.9,
        RouteKind::River if winter => 0.7,
        RouteKind::River if matches!(month, 7 | 8) => 0.85,
        RouteKind::Coastal if winter => 0.8,
        RouteKind::Sea if winter => 0.6,
        RouteKind::Sea if matches!(month, 3 | 11) => 0.85,
        RouteKind::LongOverland if winter => 0.7,
        _ => 1.0,
    }
}

// ---------------------------------------------------------------------------
// Prices and volume
// ---------------------------------------------------------------------------

/// `base × clamp(demand / supply, 0.2, 5.0)`; falls with supply, rises with demand.
pub fn market_price(base_price: f64, supply: f64, demand: f64) -> Option<f64> {
    if !(base_price.is_finite() && base_price > 0.0) || !supply.is_finite() || !demand.is_finite()
    {
        return None;
    }
    let ratio = demand.max(MIN_MARKET_LEVEL) / supply.max(MIN_MARKET_LEVEL);
    Some(base_price * ratio.clamp(MIN_PRICE_RATIO, MAX_PRICE_RATIO))
}

/// Demand-over-supply seasonal price pressure for the month (1–12).
pub fn seasonal_price_factor(good: &TradeGood, month: u32) -> f64 {
    let idx = (month.clamp(1, 12) - 1) as usize;
    good.seasonal_demand[idx] / good.seasonal_supply[idx]
}

/// Monthly volume a route settles at: the scarcer side of the trade, scaled and capped.
pub fn optimal_volume(supply: f64, demand: f64, scale: f64, cap: f64) -> f64 {
    (supply.min(demand).max(0.0) * scale).min(cap)
}

/// Relative change of price in response to shifts in supply and demand.
pub fn price_change_from_forces(supply_change: f64, demand_change: f64, elasticity: f64) -> f64 {
    (demand_change - supply_change) * elasticity
}

// ---------------------------------------------------------------------------
// Profit
// ---------------------------------------------------------------------------

/// Volume actually carried after efficiency, safety and seasonal adjustments.
pub fn effective_volume(route: &TradeRoute) -> f64 {
    if !route.status.carries_goods() {
        return 0.0;
    }
    route.current_volume * route.efficiency_rating * route.safety_rating * route.seasonal_modifier
}

/// The one place profit figures are computed.
///
/// `profit_per_unit = destination_price − source_price − transport_cost_per_unit`;
/// profitability and expected monthly profit are derived from it.
pub fn recalculate_profit_metrics(route: &mut TradeRoute) {
    let profit_per_unit =
        route.destination_price - route.source_price - route.transport_cost_per_unit;
    route.profit = ProfitMetrics::derive(profit_per_unit, route.source_price, effective_volume(route));
}

/// Monthly revenue effect of a disruption, from the route before and after it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RevenueImpact {
    pub pre_monthly_revenue: f64,
    pub post_monthly_revenue: f64,
    /// Always `pre_monthly_revenue − post_monthly_revenue`.
    pub monthly_delta: f64,
    pub volume_reduction_pct: f64,
}

impl RevenueImpact {
    pub fn over_months(&self, months: f64) -> f64 {
        self.monthly_delta * months
    }
}

pub fn revenue_impact(before: &TradeRoute, after: &TradeRoute) -> RevenueImpact {
    let pre = before.expected_monthly_profit();
    let post = after.expected_monthly_profit();
    let volume_reduction_pct = if before.current_volume > 0.0 {
        (1.0 - after.current_volume / before.current_volume) * 100.0
    } else {
        0.0
    };
    RevenueImpact {
        pre_monthly_revenue: pre,
        post_monthly_revenue: post,
        monthly_delta: pre - post,
        volume_reduction_pct,
    }
}

// ---------------------------------------------------------------------------
// Hubs
// ---------------------------------------------------------------------------

pub fn hub_base_capacity(kind: HubKind) -> f64 {
    match kind {
        HubKind::LocalMarket => 100.0,
        HubKind::RegionalHub => 250.0,
        HubKind::Crossroads => 300.0,
        HubKind::MajorTradingCenter => 500.0,
        HubKind::InternationalPort => 1000.0,
    }
}

fn valid_level(level: u8) -> bool {
    (MIN_HUB_LEVEL..=MAX_HUB_LEVEL).contains(&level)
}

/// `base_capacity(kind) × (1 + 0.25 × (level − 1))`, always from base.
pub fn hub_capacity(kind: HubKind, level: u8) -> Option<f64> {
    valid_level(level)
        .then(|| hub_base_capacity(kind) * (1.0 + HUB_CAPACITY_STEP * f64::from(level - 1)))
}

pub fn hub_infrastructure_bonus(level: u8) -> Option<f64> {
    valid_level(level).then(|| 1.0 + HUB_INFRASTRUCTURE_STEP * f64::from(level - 1))
}

pub fn hub_security(base_security: f64, level: u8) -> Option<f64> {
    valid_level(level).then(|| (base_security + HUB_SECURITY_STEP * f64::from(level - 1)).min(1.0))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn percentage_change(old: f64, new: f64) -> Option<f64> {
    (old != 0.0 && old.is_finite() && new.is_finite()).then(|| (new - old) / old * 100.0)
}

pub fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t.clamp(0.0, 1.0)
}

pub fn return_on_investment(gain: f64, cost: f64) -> Option<f64> {
    (cost > 0.0).then(|| (gain - cost) / cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::time::SimTime;
    use crate::model::{RegionId, Resource, RouteId, RouteStatus};

    fn route(status: RouteStatus) -> TradeRoute {
        let id = RouteId::new(RegionId(1), RegionId(2), Resource::Grain);
        TradeRoute {
            id,
            source: id.source,
            destination: id.destination,
            resource: id.resource,
            kind: RouteKind::Land,
            status,
            path: vec![id.source, id.destination],
            features: PathFeatures::default(),
            distance_km: 100.0,
            safety_rating: 0.8,
            efficiency_rating: 0.5,
            seasonal_modifier: 1.0,
            base_volume: 100.0,
            current_volume: 100.0,
            source_price: 8.0,
            destination_price: 20.0,
            transport_cost_per_unit: 2.0,
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
        }
    }

    #[test]
    fn market_price_monotonic() {
        let base = market_price(10.0, 1.0, 1.0).unwrap();
        assert_eq!(base, 10.0);
        assert!(market_price(10.0, 2.0, 1.0).unwrap() < base);
        assert!(market_price(10.0, 1.0, 2.0).unwrap() > base);
    }

    #[test]
    fn market_price_ratio_is_clamped() {
        assert_eq!(market_price(10.0, 100.0, 1.0).unwrap(), 2.0);
        assert_eq!(market_price(10.0, 0.0, 1.0).unwrap(), 50.0);
        assert!(market_price(0.0, 1.0, 1.0).is_none());
        assert!(market_price(10.0, f64::NAN, 1.0).is_none());
    }

    #[test]
    fn transport_cost_formula() {
        // 100 km land, bulk 1.5, perishability 0.3, efficiency 0.5:
        // 100 × 0.01 × 1.5 = 1.5; × (1 + 0.3 × 0.1) = 1.545; / 0.5 = 3.09
        let cost = transport_cost(100.0, 1.5, 0.3, 0.5, RouteKind::Land).unwrap();
        assert!((cost - 3.09).abs() < 1e-9);
    }

    #[test]
    fn sea_is_cheaper_than_long_overland() {
        let sea = transport_cost(500.0, 1.0, 0.0, 1.0, RouteKind::Sea).unwrap();
        let caravan = transport_cost(500.0, 1.0, 0.0, 1.0, RouteKind::LongOverland).unwrap();
        assert!(sea < caravan);
    }

    #[test]
    fn transport_cost_rejects_bad_input() {
        assert!(transport_cost(-1.0, 1.0, 0.0, 1.0, RouteKind::Land).is_none());
        assert!(transport_cost(10.0, 1.0, 0.0, 0.0, RouteKind::Land).is_none());
        assert!(transport_cost(10.0, 1.0, 0.0, 1.5, RouteKind::Land).is_none());
    }

    #[test]
    fn efficiency_is_clamped() {
        let all = PathFeatures {
            coastal: true,
            river: true,
            mountain_pass: false,
        };
        assert_eq!(route_efficiency(all), 1.0);
        let pass = PathFeatures {
            mountain_pass: true,
            ..PathFeatures::default()
        };
        assert!((route_efficiency(pass) - 0.5).abs() < 1e-12);
        for coastal in [false, true] {
            for river in [false, true] {
                for mountain_pass in [false, true] {
                    let e = route_efficiency(PathFeatures {
                        coastal,
                        river,
                        mountain_pass,
                    });
                    assert!((0.0..=1.0).contains(&e));
                }
            }
        }
    }

    #[test]
    fn distance_safety_penalty_caps() {
        assert!((distance_safety(0.9, 0.0).unwrap() - 0.9).abs() < 1e-12);
        assert!((distance_safety(0.9, 300.0).unwrap() - 0.75).abs() < 1e-12);
        assert!((distance_safety(0.9, 1000.0).unwrap() - 0.6).abs() < 1e-12);
        assert!((distance_safety(0.9, 10_000.0).unwrap() - 0.6).abs() < 1e-12);
        assert_eq!(distance_safety(0.2, 5000.0).unwrap(), MIN_ROUTE_SAFETY);
        assert!(distance_safety(0.9, -5.0).is_none());
    }

    #[test]
    fn preferred_kind_falls_back_when_unsupported() {
        let inland = PathFeatures::default();
        assert_eq!(resolve_route_kind(RouteKind::Sea, inland, 300.0), RouteKind::Land);
        assert_eq!(
            resolve_route_kind(RouteKind::Land, inland, 900.0),
            RouteKind::LongOverland
        );
        let river = PathFeatures {
            river: true,
            ..PathFeatures::default()
        };
        assert_eq!(resolve_route_kind(RouteKind::River, river, 300.0), RouteKind::River);
        assert_eq!(resolve_route_kind(RouteKind::Coastal, river, 300.0), RouteKind::River);
    }

    #[test]
    fn profit_metrics_are_consistent() {
        let mut r = route(RouteStatus::Active);
        recalculate_profit_metrics(&mut r);
        // 20 − 8 − 2 = 10 per unit; effective = 100 × 0.5 × 0.8 × 1.0 = 40
        assert!((r.profit_per_unit() - 10.0).abs() < 1e-12);
        assert!((r.profitability() - 1.25).abs() < 1e-12);
        assert!((r.expected_monthly_profit() - 400.0).abs() < 1e-9);
    }

    #[test]
    fn closed_routes_have_no_effective_volume() {
        let mut r = route(RouteStatus::SeasonallyClosed);
        recalculate_profit_metrics(&mut r);
        assert_eq!(effective_volume(&r), 0.0);
        assert_eq!(r.expected_monthly_profit(), 0.0);
    }

    #[test]
    fn losing_route_has_zero_profitability() {
        let mut r = route(RouteStatus::Active);
        r.destination_price = 9.0;
        recalculate_profit_metrics(&mut r);
        assert!(r.profit_per_unit() < 0.0);
        assert_eq!(r.profitability(), 0.0);
    }

    #[test]
    fn revenue_impact_delta_is_pre_minus_post() {
        let mut before = route(RouteStatus::Active);
        recalculate_profit_metrics(&mut before);
        let mut after = before.clone();
        after.status = RouteStatus::Disrupted;
        after.current_volume *= 0.1;
        after.safety_rating *= 0.3;
        recalculate_profit_metrics(&mut after);

        let impact = revenue_impact(&before, &after);
        assert!((impact.monthly_delta - (impact.pre_monthly_revenue - impact.post_monthly_revenue)).abs() < 1e-12);
        assert!((impact.volume_reduction_pct - 90.0).abs() < 1e-9);
        assert!((impact.over_months(6.0) - impact.monthly_delta * 6.0).abs() < 1e-9);
    }

    #[test]
    fn hub_capacity_from_base() {
        assert_eq!(hub_capacity(HubKind::LocalMarket, 1), Some(100.0));
        assert_eq!(hub_capacity(HubKind::LocalMarket, 3), Some(150.0));
        assert_eq!(hub_capacity(HubKind::InternationalPort, 5), Some(2000.0));
        assert_eq!(hub_capacity(HubKind::LocalMarket, 0), None);
        assert_eq!(hub_capacity(HubKind::LocalMarket, 6), None);
    }

    #[test]
    fn hub_security_caps_at_one() {
        assert!((hub_security(0.9, 1).unwrap() - 0.9).abs() < 1e-12);
        assert_eq!(hub_security(0.9, 5), Some(1.0));
        assert!((hub_infrastructure_bonus(5).unwrap() - 1.6).abs() < 1e-12);
    }

    #[test]
    fn seasonal_modifiers_hit_sea_hardest_in_winter() {
        assert!(seasonal_route_modifier(RouteKind::Sea, 1) < seasonal_route_modifier(RouteKind::Land, 1));
        assert_eq!(seasonal_route_modifier(RouteKind::Sea, 6), 1.0);
        let grain = Resource::Grain.properties();
        assert!(seasonal_price_factor(&grain, 1) > seasonal_price_factor(&grain, 9));
    }

    #[test]
    fn helpers() {
        assert_eq!(percentage_change(10.0, 12.0), Some(20.0));
        assert_eq!(percentage_change(0.0, 12.0), None);
        assert_eq!(lerp(2.0, 4.0, 0.5), 3.0);
        assert_eq!(lerp(2.0, 4.0, 2.0), 4.0);
        assert_eq!(return_on_investment(150.0, 100.0), Some(0.5));
        assert_eq!(optimal_volume(1.5, 1.2, 100.0, 1000.0), 120.0);
        assert_eq!(optimal_volume(50.0, 40.0, 100.0, 1000.0), 1000.0);
        assert_eq!(travel_days(100.0, RouteKind::Land), Some(2.0));
    }
}
