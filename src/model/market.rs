use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::region::RegionId;
use super::resource::Resource;
use crate::ecs::time::SimTime;

/// Rolling window length for price history.
pub const PRICE_HISTORY_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum PriceTrend {
    Stable,
    Rising,
    Falling,
    Volatile,
    ShockUp,
    ShockDown,
}

string_enum!(PriceTrend {
    Stable => "stable",
    Rising => "rising",
    Falling => "falling",
    Volatile => "volatile",
    ShockUp => "shock_up",
    ShockDown => "shock_down",
});

impl PriceTrend {
    pub fn is_shock(self) -> bool {
        matches!(self, PriceTrend::ShockUp | PriceTrend::ShockDown)
    }
}

/// A price shock still working its way out of a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveShock {
    pub magnitude: f64,
    pub cause: String,
    pub months_total: u32,
    pub months_remaining: u32,
}

impl ActiveShock {
    /// Price multiplier, fading linearly back to 1.0 as the shock runs out.
    pub fn multiplier(&self) -> f64 {
        if self.months_total == 0 {
            return 1.0;
        }
        let remaining = self.months_remaining as f64 / self.months_total as f64;
        1.0 + self.magnitude * remaining
    }
}

/// Price state of one resource in one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub region: RegionId,
    pub resource: Resource,
    pub base_price: f64,
    pub current_price: f64,
    /// 1.0 is balanced.
    pub supply: f64,
    pub demand: f64,
    /// Profile values the market relaxes toward.
    pub base_supply: f64,
    pub base_demand: f64,
    pub trend: PriceTrend,
    pub price_change_rate: f64,
    pub volatility: f64,
    pub price_history: VecDeque<f64>,
    pub avg_price_12m: f64,
    pub max_price_12m: f64,
    pub min_price_12m: f64,
    pub shock: Option<ActiveShock>,
    pub last_updated: SimTime,
}

impl MarketSnapshot {
    /// Append a price to the rolling window and refresh avg/max/min.
    pub fn record_price(&mut self, price: f64) {
        if self.price_history.len() == PRICE_HISTORY_LEN {
            self.price_history.pop_front();
        }
        self.price_history.push_back(price);

        let n = self.price_history.len() as f64;
        self.avg_price_12m = self.price_history.iter().sum::<f64>() / n;
        self.max_price_12m = self
            .price_history
            .iter()
            .copied()
            .fold(f64::MIN, f64::max);
        self.min_price_12m = self
            .price_history
            .iter()
            .copied()
            .fold(f64::MAX, f64::min);
    }

    pub fn is_above_average(&self) -> bool {
        self.current_price > self.avg_price_12m * 1.1
    }

    /// Relative deviation of the current price from its 12-period average.
    pub fn price_deviation(&self) -> f64 {
        if self.avg_price_12m > 0.0 {
            (self.current_price - self.avg_price_12m) / self.avg_price_12m
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            region: RegionId(1),
            resource: Resource::Grain,
            base_price: 10.0,
            current_price: 10.0,
            supply: 1.0,
            demand: 1.0,
            base_supply: 1.0,
            base_demand: 1.0,
            trend: PriceTrend::Stable,
            price_change_rate: 0.0,
            volatility: 0.1,
            price_history: VecDeque::new(),
            avg_price_12m: 10.0,
            max_price_12m: 10.0,
            min_price_12m: 10.0,
            shock: None,
            last_updated: SimTime::default(),
        }
    }

    #[test]
    fn history_keeps_last_twelve() {
        let mut market = snapshot();
        for i in 1..=20 {
            market.record_price(i as f64);
        }
        assert_eq!(market.price_history.len(), PRICE_HISTORY_LEN);
        assert_eq!(market.price_history.front(), Some(&9.0));
        assert_eq!(market.max_price_12m, 20.0);
        assert_eq!(market.min_price_12m, 9.0);
        assert!((market.avg_price_12m - 14.5).abs() < 1e-12);
    }

    #[test]
    fn shock_multiplier_fades_out() {
        let mut shock = ActiveShock {
            magnitude: 0.6,
            cause: "famine".to_string(),
            months_total: 3,
            months_remaining: 3,
        };
        assert!((shock.multiplier() - 1.6).abs() < 1e-12);
        shock.months_remaining = 0;
        assert!((shock.multiplier() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn deviation_relative_to_average() {
        let mut market = snapshot();
        market.avg_price_12m = 10.0;
        market.current_price = 12.0;
        assert!((market.price_deviation() - 0.2).abs() < 1e-12);
        assert!(market.is_above_average());
    }
}
