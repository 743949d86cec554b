use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read trade config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse trade config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid trade config: {0}")]
    Invalid(String),
}

/// Tunables for the trade engine. Every field has a default, so a JSON file only
/// needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeConfig {
    pub min_viable_profitability: f64,
    pub min_viable_safety: f64,
    /// Active routes at or below this profitability are abandoned on the monthly tick.
    pub abandon_profitability_threshold: f64,
    /// Multiplier from `min(supply, demand)` to monthly route volume.
    pub volume_scale: f64,
    pub max_route_volume: f64,
    pub pathfinding: PathfindingConfig,
    pub market: MarketConfig,
    pub hubs: HubConfig,
    pub recovery: RecoveryConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            min_viable_profitability: 0.05,
            min_viable_safety: 0.3,
            abandon_profitability_threshold: 0.0,
            volume_scale: 100.0,
            max_route_volume: 1000.0,
            pathfinding: PathfindingConfig::default(),
            market: MarketConfig::default(),
            hubs: HubConfig::default(),
            recovery: RecoveryConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfindingConfig {
    pub max_distance_km: f64,
    pub max_hops: usize,
    pub cache_capacity: usize,
    pub max_alternatives: usize,
    pub distance_weight: f64,
    pub safety_weight: f64,
    pub congestion_weight: f64,
    /// Routes per link that make up one congestion band.
    pub congestion_band_size: u32,
    /// Extra cost, in km-equivalents, per congestion band on a link.
    pub congestion_km_per_band: f64,
    /// Extra cost per km of mountain pass per unit of bulk above 1.0.
    pub mountain_bulk_penalty: f64,
}

impl Default for PathfindingConfig {
    fn default() -> Self {
        Self {
            max_distance_km: 2000.0,
            max_hops: 8,
            cache_capacity: 1000,
            max_alternatives: 3,
            distance_weight: 1.0,
            safety_weight: 0.3,
            congestion_weight: 0.2,
            congestion_band_size: 5,
            congestion_km_per_band: 50.0,
            mountain_bulk_penalty: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Share of the gap to the target supply/demand closed per market tick.
    pub adjustment_rate: f64,
    /// Pull of price toward its 12-period average per market tick.
    pub stabilization_rate: f64,
    pub volatility_decay: f64,
    pub min_volatility: f64,
    pub volatile_threshold: f64,
    pub trend_threshold: f64,
    /// Per-market chance of a random shock each market tick.
    pub shock_chance: f64,
    pub min_shock_magnitude: f64,
    pub max_shock_magnitude: f64,
    /// Magnitudes at or above this classify as a shock trend; smaller ones as volatile.
    pub shock_trend_threshold: f64,
    pub shock_duration_months: u32,
    pub min_price_factor: f64,
    pub max_price_factor: f64,
    /// Route volume, in units per month, that moves supply by 1.0.
    pub flow_saturation_volume: f64,
    /// Relative price move that triggers a `MarketConditionsChanged` event.
    pub event_threshold: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            adjustment_rate: 0.1,
            stabilization_rate: 0.05,
            volatility_decay: 0.95,
            min_volatility: 0.01,
            volatile_threshold: 0.3,
            trend_threshold: 0.1,
            shock_chance: 0.01,
            min_shock_magnitude: 0.2,
            max_shock_magnitude: 0.6,
            shock_trend_threshold: 0.5,
            shock_duration_months: 3,
            min_price_factor: 0.1,
            max_price_factor: 10.0,
            flow_saturation_volume: 1000.0,
            event_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub base_security: f64,
    /// A region without a hub is designated a local market at this many endpoint routes.
    pub auto_hub_route_threshold: usize,
    /// Incoming share of effective capacity that makes a resource a specialization.
    pub specialization_share: f64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            base_security: 0.9,
            auto_hub_route_threshold: 3,
            specialization_share: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Recovery takes this many months per month of disruption, clamped below.
    pub months_per_disruption_month: f64,
    pub min_recovery_months: f64,
    pub max_recovery_months: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            months_per_disruption_month: 1.0,
            min_recovery_months: 1.0,
            max_recovery_months: 12.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub route_batch_size: usize,
    pub performance_warning_ms: u64,
    pub close_sea_routes_in_winter: bool,
    /// Monthly disruption chance for a route with zero safety; scaled by `1 - safety`.
    pub hazard_chance: f64,
    pub hazard_duration_months: f64,
    /// Relative change in effective volume that triggers a `VolumeChanged` event.
    pub volume_event_threshold: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            route_batch_size: 25,
            performance_warning_ms: 16,
            close_sea_routes_in_winter: true,
            hazard_chance: 0.01,
            hazard_duration_months: 3.0,
            volume_event_threshold: 0.05,
        }
    }
}

impl TradeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: TradeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn probability(name: &str, v: f64) -> Result<(), ConfigError> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{name} must be in [0, 1], got {v}")))
            }
        }

        if self.scheduler.route_batch_size == 0 {
            return Err(ConfigError::Invalid("route_batch_size must be > 0".into()));
        }
        if self.pathfinding.cache_capacity == 0 {
            return Err(ConfigError::Invalid("cache_capacity must be > 0".into()));
        }
        if self.pathfinding.max_hops == 0 {
            return Err(ConfigError::Invalid("max_hops must be > 0".into()));
        }
        if self.pathfinding.congestion_band_size == 0 {
            return Err(ConfigError::Invalid(
                "congestion_band_size must be > 0".into(),
            ));
        }
        if self.volume_scale <= 0.0 || self.max_route_volume <= 0.0 {
            return Err(ConfigError::Invalid(
                "volume_scale and max_route_volume must be positive".into(),
            ));
        }
        if self.recovery.min_recovery_months <= 0.0
            || self.recovery.min_recovery_months > self.recovery.max_recovery_months
        {
            return Err(ConfigError::Invalid(format!(
                "recovery months must satisfy 0 < min <= max, got {}..{}",
                self.recovery.min_recovery_months, self.recovery.max_recovery_months
            )));
        }
        if self.market.min_shock_magnitude > self.market.max_shock_magnitude {
            return Err(ConfigError::Invalid(
                "min_shock_magnitude exceeds max_shock_magnitude".into(),
            ));
        }
        if self.market.min_price_factor <= 0.0
            || self.market.min_price_factor > self.market.max_price_factor
        {
            return Err(ConfigError::Invalid(
                "price factors must satisfy 0 < min <= max".into(),
            ));
        }
        probability("min_viable_safety", self.min_viable_safety)?;
        probability("market.shock_chance", self.market.shock_chance)?;
        probability("market.adjustment_rate", self.market.adjustment_rate)?;
        probability("market.stabilization_rate", self.market.stabilization_rate)?;
        probability("scheduler.hazard_chance", self.scheduler.hazard_chance)?;
        Ok(())
    }
}
