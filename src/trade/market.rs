//! Per-(region, resource) price state, driven by supply/demand, seasons and shocks.

use std::collections::{BTreeMap, VecDeque};

use rand::Rng;

use super::calculator::{
    market_price, percentage_change, price_change_from_forces, seasonal_price_factor,
};
use super::collaborators::RegionDirectory;
use super::config::MarketConfig;
use super::error::ValidationError;
use super::events::TradeEvent;
use crate::ecs::time::SimTime;
use crate::model::{ActiveShock, MarketSnapshot, PriceTrend, RegionGraph, RegionId, Resource};

// ---------------------------------------------------------------------------
// Constants: Initial profile
// ---------------------------------------------------------------------------

const PRODUCER_SUPPLY: f64 = 1.5;
const NON_PRODUCER_SUPPLY: f64 = 0.6;
const RECEIVER_DEMAND: f64 = 1.2;
const NON_RECEIVER_DEMAND: f64 = 0.5;
const MIN_LEVEL: f64 = 0.01;
/// Bound on the one-tick overshoot from moving supply and demand.
const MAX_FORCE_PRESSURE: f64 = 0.5;
/// Random shock chance is `shock_chance × volatility × this`; a good with volatility
/// 0.2 sees exactly `shock_chance`.
const SHOCK_WEIGHT_SCALE: f64 = 5.0;
const MAX_VOLATILITY: f64 = 1.0;

/// Net monthly route flow through one market: `imports − exports`, in units.
pub type MarketFlows = BTreeMap<(RegionId, Resource), f64>;

#[derive(Debug, Default)]
pub struct MarketEngine {
    config: MarketConfig,
    markets: BTreeMap<(RegionId, Resource), MarketSnapshot>,
}

impl MarketEngine {
    pub fn new(config: MarketConfig) -> Self {
        Self {
            config,
            markets: BTreeMap::new(),
        }
    }

    pub fn get(&self, region: RegionId, resource: Resource) -> Option<&MarketSnapshot> {
        self.markets.get(&(region, resource))
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &MarketSnapshot> {
        self.markets.values()
    }

    /// Replace every market with the given snapshots.
    pub fn restore(&mut self, snapshots: impl IntoIterator<Item = MarketSnapshot>) {
        self.markets = snapshots
            .into_iter()
            .map(|m| ((m.region, m.resource), m))
            .collect();
    }

    /// The market for a pair, created from the region's profile on first use.
    pub fn ensure(
        &mut self,
        region: RegionId,
        resource: Resource,
        regions: &dyn RegionDirectory,
        now: SimTime,
    ) -> &MarketSnapshot {
        let config = &self.config;
        self.markets
            .entry((region, resource))
            .or_insert_with(|| Self::open_market(config, region, resource, regions, now))
    }

    /// Current price for a pair, creating the market if needed.
    pub fn price(
        &mut self,
        region: RegionId,
        resource: Resource,
        regions: &dyn RegionDirectory,
        now: SimTime,
    ) -> f64 {
        self.ensure(region, resource, regions, now).current_price
    }

    fn open_market(
        config: &MarketConfig,
        region: RegionId,
        resource: Resource,
        regions: &dyn RegionDirectory,
        now: SimTime,
    ) -> MarketSnapshot {
        let good = resource.properties();
        let supply = if regions.can_produce(region, resource) {
            PRODUCER_SUPPLY
        } else {
            NON_PRODUCER_SUPPLY
        };
        let demand = if regions.can_receive(region, resource) {
            RECEIVER_DEMAND
        } else {
            NON_RECEIVER_DEMAND
        };
        let raw = market_price(good.base_price, supply, demand).unwrap_or(good.base_price)
            * seasonal_price_factor(&good, now.month());
        let price = clamp_price(config, good.base_price, raw);

        let mut market = MarketSnapshot {
            region,
            resource,
            base_price: good.base_price,
            current_price: price,
            supply,
            demand,
            base_supply: supply,
            base_demand: demand,
            trend: PriceTrend::Stable,
            price_change_rate: 0.0,
            volatility: good.volatility,
            price_history: VecDeque::new(),
            avg_price_12m: price,
            max_price_12m: price,
            min_price_12m: price,
            shock: None,
            last_updated: now,
        };
        market.record_price(price);
        market
    }

    /// Shock one market's price by `magnitude` (0.3 is +30%). The shock fades over
    /// `shock_duration_months` market ticks.
    pub fn apply_price_shock(
        &mut self,
        region: RegionId,
        resource: Resource,
        magnitude: f64,
        cause: &str,
        regions: &dyn RegionDirectory,
        now: SimTime,
    ) -> Result<TradeEvent, ValidationError> {
        if !magnitude.is_finite() || magnitude <= -1.0 {
            return Err(ValidationError::InvalidShock(magnitude));
        }
        self.ensure(region, resource, regions, now);
        let config = self.config.clone();
        let Some(market) = self.markets.get_mut(&(region, resource)) else {
            return Err(ValidationError::UnknownRegion(region));
        };
        Ok(shock_market(&config, market, magnitude, cause, now))
    }

    /// One market-cadence update of every known market.
    ///
    /// Returns the `PriceShock` events for random shocks followed by one
    /// `MarketConditionsChanged` per region whose prices moved noticeably.
    pub fn tick(&mut self, flows: &MarketFlows, now: SimTime, rng: &mut impl Rng) -> Vec<TradeEvent> {
        let config = self.config.clone();
        let mut shocks = Vec::new();
        let mut changes: BTreeMap<RegionId, RegionChanges> = BTreeMap::new();

        for (key, market) in self.markets.iter_mut() {
            let good = market.resource.properties();
            let chance = (config.shock_chance * good.volatility * SHOCK_WEIGHT_SCALE).min(1.0);
            if market.shock.is_none() && rng.random_range(0.0..1.0) < chance {
                let size = rng.random_range(config.min_shock_magnitude..=config.max_shock_magnitude);
                let magnitude = if rng.random_bool(0.5) { size } else { -size };
                shocks.push(shock_market(&config, market, magnitude, "market forces", now));
            }

            let old_price = market.current_price;
            let old_supply = market.supply;
            let old_demand = market.demand;
            let flow = flows.get(key).copied().unwrap_or(0.0);
            update_market(&config, market, flow, now);

            let moved = (market.current_price - old_price).abs() / old_price.max(f64::EPSILON);
            if moved > config.event_threshold {
                let entry = changes.entry(market.region).or_default();
                let pct = |old: f64, new: f64| percentage_change(old, new).unwrap_or(0.0);
                entry.price.insert(market.resource, pct(old_price, market.current_price));
                entry.supply.insert(market.resource, pct(old_supply, market.supply));
                entry.demand.insert(market.resource, pct(old_demand, market.demand));
            }
        }

        shocks.extend(changes.into_iter().map(|(region, c)| {
            TradeEvent::MarketConditionsChanged {
                region,
                price_changes: c.price,
                supply_changes: c.supply,
                demand_changes: c.demand,
                cause: "market tick".to_string(),
                at: now,
            }
        }));
        shocks
    }

    /// Up to `n` markets for a resource, highest current price first.
    pub fn best_markets(&self, resource: Resource, n: usize) -> Vec<MarketSnapshot> {
        let mut found: Vec<&MarketSnapshot> = self
            .markets
            .values()
            .filter(|m| m.resource == resource)
            .collect();
        found.sort_by(|a, b| {
            b.current_price
                .total_cmp(&a.current_price)
                .then_with(|| a.region.cmp(&b.region))
        });
        found.into_iter().take(n).cloned().collect()
    }

    /// Mean current price over known markets within `hops` links of `region`.
    pub fn regional_average_price(
        &self,
        graph: &RegionGraph,
        region: RegionId,
        resource: Resource,
        hops: usize,
    ) -> Option<f64> {
        let prices: Vec<f64> = graph
            .within_hops(region, hops)
            .into_iter()
            .filter_map(|r| self.markets.get(&(r, resource)))
            .map(|m| m.current_price)
            .collect();
        (!prices.is_empty()).then(|| prices.iter().sum::<f64>() / prices.len() as f64)
    }
}

#[derive(Default)]
struct RegionChanges {
    price: BTreeMap<Resource, f64>,
    supply: BTreeMap<Resource, f64>,
    demand: BTreeMap<Resource, f64>,
}

fn clamp_price(config: &MarketConfig, base_price: f64, price: f64) -> f64 {
    price.clamp(
        base_price * config.min_price_factor,
        base_price * config.max_price_factor,
    )
}

fn shock_trend(config: &MarketConfig, magnitude: f64) -> PriceTrend {
    if magnitude.abs() < config.shock_trend_threshold {
        PriceTrend::Volatile
    } else if magnitude > 0.0 {
        PriceTrend::ShockUp
    } else {
        PriceTrend::ShockDown
    }
}

fn shock_market(
    config: &MarketConfig,
    market: &mut MarketSnapshot,
    magnitude: f64,
    cause: &str,
    now: SimTime,
) -> TradeEvent {
    let old_price = market.current_price;
    let new_price = clamp_price(config, market.base_price, old_price * (1.0 + magnitude));
    let trend = shock_trend(config, magnitude);

    market.shock = Some(ActiveShock {
        magnitude,
        cause: cause.to_string(),
        months_total: config.shock_duration_months,
        months_remaining: config.shock_duration_months,
    });
    market.current_price = new_price;
    market.price_change_rate = (new_price - old_price) / old_price.max(f64::EPSILON);
    market.volatility = (market.volatility + magnitude.abs()).min(MAX_VOLATILITY);
    market.trend = trend;
    market.last_updated = now;

    tracing::debug!(
        region = %market.region,
        resource = %market.resource,
        magnitude,
        cause,
        "price shock"
    );

    TradeEvent::PriceShock {
        region: market.region,
        resource: market.resource,
        old_price,
        new_price,
        magnitude,
        trend,
        cause: cause.to_string(),
        duration_months: config.shock_duration_months,
        at: now,
    }
}

fn update_market(config: &MarketConfig, market: &mut MarketSnapshot, flow: f64, now: SimTime) {
    let good = market.resource.properties();

    let (old_supply, old_demand) = (market.supply, market.demand);
    let target_supply = (market.base_supply + flow / config.flow_saturation_volume).max(MIN_LEVEL);
    let target_demand = market.base_demand.max(MIN_LEVEL);
    market.supply += (target_supply - market.supply) * config.adjustment_rate;
    market.demand += (target_demand - market.demand) * config.adjustment_rate;

    // Elastic goods overshoot while supply or demand is still moving.
    let pressure = price_change_from_forces(
        (market.supply - old_supply) / old_supply.max(MIN_LEVEL),
        (market.demand - old_demand) / old_demand.max(MIN_LEVEL),
        good.elasticity,
    )
    .clamp(-MAX_FORCE_PRESSURE, MAX_FORCE_PRESSURE);

    let old_price = market.current_price;
    let raw = market_price(market.base_price, market.supply, market.demand)
        .unwrap_or(market.base_price)
        * seasonal_price_factor(&good, now.month())
        * (1.0 + pressure);
    let stabilized = raw + (market.avg_price_12m - raw) * config.stabilization_rate;
    let multiplier = market.shock.as_ref().map_or(1.0, ActiveShock::multiplier);
    let price = clamp_price(config, market.base_price, stabilized * multiplier);

    market.current_price = price;
    market.price_change_rate = (price - old_price) / old_price.max(f64::EPSILON);
    market.record_price(price);
    market.volatility = (market.volatility * config.volatility_decay).max(config.min_volatility);

    // A shock in its last month no longer drives the trend.
    if let Some(shock) = market.shock.as_mut() {
        shock.months_remaining = shock.months_remaining.saturating_sub(1);
        if shock.months_remaining == 0 {
            market.shock = None;
        }
    }

    market.trend = match &market.shock {
        Some(shock) => shock_trend(config, shock.magnitude),
        None if market.price_change_rate > config.trend_threshold => PriceTrend::Rising,
        None if market.price_change_rate < -config.trend_threshold => PriceTrend::Falling,
        None if market.volatility > config.volatile_threshold => PriceTrend::Volatile,
        None => PriceTrend::Stable,
    };
    market.last_updated = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trade::collaborators::RegionCatalog;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn catalog() -> RegionCatalog {
        let mut c = RegionCatalog::new();
        c.add_region(RegionId(1), &[Resource::Grain])
            .add_region(RegionId(2), &[Resource::Iron])
            .refuse(RegionId(2), Resource::Spices);
        c
    }

    fn calm() -> MarketConfig {
        MarketConfig {
            shock_chance: 0.0,
            ..MarketConfig::default()
        }
    }

    #[test]
    fn producers_sell_cheaper_than_importers() {
        let regions = catalog();
        let mut engine = MarketEngine::new(calm());
        let t = SimTime::from_year_month(1, 6);
        let at_producer = engine.price(RegionId(1), Resource::Grain, &regions, t);
        let at_importer = engine.price(RegionId(2), Resource::Grain, &regions, t);
        assert!(at_producer < at_importer);
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn markets_open_lazily_with_profile_levels() {
        let regions = catalog();
        let mut engine = MarketEngine::new(calm());
        assert!(engine.get(RegionId(2), Resource::Spices).is_none());
        let market = engine
            .ensure(RegionId(2), Resource::Spices, &regions, SimTime::default())
            .clone();
        assert_eq!(market.supply, NON_PRODUCER_SUPPLY);
        assert_eq!(market.demand, NON_RECEIVER_DEMAND);
        assert_eq!(market.price_history.len(), 1);
    }

    #[test]
    fn price_shock_sets_trend_and_fades() {
        let regions = catalog();
        let mut engine = MarketEngine::new(calm());
        let t = SimTime::from_year_month(1, 6);
        let before = engine.price(RegionId(1), Resource::Iron, &regions, t);

        let event = engine
            .apply_price_shock(RegionId(1), Resource::Iron, 0.6, "mine collapse", &regions, t)
            .unwrap();
        let TradeEvent::PriceShock { new_price, trend, .. } = event else {
            panic!("expected a price shock event");
        };
        assert!((new_price - before * 1.6).abs() < 1e-9);
        assert_eq!(trend, PriceTrend::ShockUp);

        let mut rng = SmallRng::seed_from_u64(7);
        for month in 7..=8 {
            engine.tick(&MarketFlows::new(), SimTime::from_year_month(1, month), &mut rng);
            assert!(engine.get(RegionId(1), Resource::Iron).unwrap().trend.is_shock());
        }
        // The tick that spends the last shock month already reports the calm trend.
        engine.tick(&MarketFlows::new(), SimTime::from_year_month(1, 9), &mut rng);
        let market = engine.get(RegionId(1), Resource::Iron).unwrap();
        assert!(market.shock.is_none());
        assert!(!market.trend.is_shock());
    }

    #[test]
    fn elastic_goods_react_harder_to_new_supply() {
        let regions = catalog();
        let mut engine = MarketEngine::new(calm());
        let t = SimTime::from_year_month(1, 6);
        let stone = engine.ensure(RegionId(2), Resource::Stone, &regions, t).clone();
        let mut gold = stone.clone();
        gold.resource = Resource::Gold;
        let (mut stone, mut idle) = (stone.clone(), stone);

        let config = calm();
        update_market(&config, &mut idle, 0.0, t);
        update_market(&config, &mut stone, 800.0, t);
        update_market(&config, &mut gold, 800.0, t);

        assert!(stone.current_price < idle.current_price);
        assert!(gold.current_price < stone.current_price);
        assert_eq!(gold.supply, stone.supply);
    }

    #[test]
    fn small_shock_is_volatile_not_shock() {
        let regions = catalog();
        let mut engine = MarketEngine::new(calm());
        let event = engine
            .apply_price_shock(RegionId(1), Resource::Grain, -0.3, "glut", &regions, SimTime::default())
            .unwrap();
        assert!(matches!(
            event,
            TradeEvent::PriceShock { trend: PriceTrend::Volatile, .. }
        ));
    }

    #[test]
    fn rejects_impossible_shock() {
        let regions = catalog();
        let mut engine = MarketEngine::new(calm());
        let err = engine
            .apply_price_shock(RegionId(1), Resource::Grain, -1.5, "x", &regions, SimTime::default())
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidShock(-1.5));
    }

    #[test]
    fn prices_stay_within_bounds() {
        let regions = catalog();
        let config = MarketConfig {
            shock_chance: 1.0,
            ..MarketConfig::default()
        };
        let mut engine = MarketEngine::new(config);
        engine.ensure(RegionId(1), Resource::Spices, &regions, SimTime::default());
        let mut rng = SmallRng::seed_from_u64(99);
        for m in 0..120 {
            engine.tick(&MarketFlows::new(), SimTime::from_minutes(0).plus_months(m as f64), &mut rng);
            let market = engine.get(RegionId(1), Resource::Spices).unwrap();
            assert!(market.current_price >= market.base_price * 0.1 - 1e-9);
            assert!(market.current_price <= market.base_price * 10.0 + 1e-9);
            assert!(market.volatility <= MAX_VOLATILITY);
        }
    }

    #[test]
    fn imports_lower_prices_over_time() {
        let regions = catalog();
        let mut engine = MarketEngine::new(calm());
        let t = SimTime::from_year_month(1, 5);
        let before = engine.price(RegionId(2), Resource::Grain, &regions, t);
        let mut flows = MarketFlows::new();
        flows.insert((RegionId(2), Resource::Grain), 800.0);
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..12 {
            engine.tick(&flows, t, &mut rng);
        }
        let after = engine.get(RegionId(2), Resource::Grain).unwrap();
        assert!(after.supply > 0.6);
        assert!(after.current_price < before);
    }

    #[test]
    fn best_markets_sorted_by_price() {
        let regions = catalog();
        let mut engine = MarketEngine::new(calm());
        let t = SimTime::from_year_month(1, 6);
        engine.ensure(RegionId(1), Resource::Grain, &regions, t);
        engine.ensure(RegionId(2), Resource::Grain, &regions, t);
        let best = engine.best_markets(Resource::Grain, 5);
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].region, RegionId(2));
        assert!(engine.best_markets(Resource::Wine, 5).is_empty());
    }

    #[test]
    fn regional_average_uses_neighbours() {
        let regions = catalog();
        let mut graph = RegionGraph::new();
        graph.add_region(RegionId(1), "A", (0.0, 0.0));
        graph.add_region(RegionId(2), "B", (10.0, 0.0));
        graph.connect(RegionId(1), RegionId(2), crate::model::LinkSpec::default());

        let mut engine = MarketEngine::new(calm());
        let t = SimTime::from_year_month(1, 6);
        let a = engine.price(RegionId(1), Resource::Grain, &regions, t);
        let b = engine.price(RegionId(2), Resource::Grain, &regions, t);
        let avg = engine
            .regional_average_price(&graph, RegionId(1), Resource::Grain, 1)
            .unwrap();
        assert!((avg - (a + b) / 2.0).abs() < 1e-9);
        assert_eq!(
            engine.regional_average_price(&graph, RegionId(1), Resource::Grain, 0),
            Some(a)
        );
        assert!(engine
            .regional_average_price(&graph, RegionId(1), Resource::Gold, 1)
            .is_none());
    }
}
