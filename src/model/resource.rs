use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// Category of tradeable good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Resource {
    Grain,
    Fish,
    Timber,
    Stone,
    Iron,
    Salt,
    Wool,
    Cloth,
    Wine,
    Spices,
    Gold,
}

string_enum!(Resource {
    Grain => "grain",
    Fish => "fish",
    Timber => "timber",
    Stone => "stone",
    Iron => "iron",
    Salt => "salt",
    Wool => "wool",
    Cloth => "cloth",
    Wine => "wine",
    Spices => "spices",
    Gold => "gold",
});

// ---------------------------------------------------------------------------
// Trade good properties
// ---------------------------------------------------------------------------

/// Static economic properties of a resource.
///
/// Seasonal tables are indexed by month (index 0 = month 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeGood {
    pub base_price: f64,
    /// Transport cost multiplier; 1.0 is an ordinary crate of goods.
    pub bulk_factor: f64,
    /// 0.0 keeps forever, 1.0 spoils within a few hundred kilometres.
    pub perishability: f64,
    /// Probability weight for random price shocks.
    pub volatility: f64,
    pub elasticity: f64,
    pub seasonal_supply: [f64; 12],
    pub seasonal_demand: [f64; 12],
}

const FLAT: [f64; 12] = [1.0; 12];
const HARVEST_SUPPLY: [f64; 12] = [0.7, 0.7, 0.8, 0.9, 1.0, 1.0, 1.1, 1.3, 1.4, 1.3, 0.9, 0.8];
const WINTER_DEMAND: [f64; 12] = [1.2, 1.2, 1.1, 1.0, 0.9, 0.9, 0.9, 0.9, 1.0, 1.0, 1.1, 1.2];
const FISHING_SUPPLY: [f64; 12] = [0.6, 0.6, 0.8, 1.0, 1.2, 1.3, 1.3, 1.2, 1.1, 0.9, 0.7, 0.6];
const LOGGING_SUPPLY: [f64; 12] = [0.8, 0.8, 0.9, 1.0, 1.1, 1.1, 1.1, 1.1, 1.0, 1.0, 0.9, 0.8];
const VINTAGE_SUPPLY: [f64; 12] = [0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 0.9, 1.0, 1.3, 1.4, 1.1, 1.0];
const FESTIVAL_DEMAND: [f64; 12] = [1.1, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.1, 1.1, 1.3];

impl Resource {
    pub fn properties(self) -> TradeGood {
        match self {
            Resource::Grain => TradeGood {
                base_price: 10.0,
                bulk_factor: 1.5,
                perishability: 0.3,
                volatility: 0.3,
                elasticity: 0.4,
                seasonal_supply: HARVEST_SUPPLY,
                seasonal_demand: WINTER_DEMAND,
            },
            Resource::Fish => TradeGood {
                base_price: 12.0,
                bulk_factor: 1.2,
                perishability: 0.8,
                volatility: 0.3,
                elasticity: 0.5,
                seasonal_supply: FISHING_SUPPLY,
                seasonal_demand: FLAT,
            },
            Resource::Timber => TradeGood {
                base_price: 8.0,
                bulk_factor: 2.0,
                perishability: 0.0,
                volatility: 0.1,
                elasticity: 0.3,
                seasonal_supply: LOGGING_SUPPLY,
                seasonal_demand: WINTER_DEMAND,
            },
            Resource::Stone => TradeGood {
                base_price: 6.0,
                bulk_factor: 3.0,
                perishability: 0.0,
                volatility: 0.05,
                elasticity: 0.2,
                seasonal_supply: FLAT,
                seasonal_demand: FLAT,
            },
            Resource::Iron => TradeGood {
                base_price: 30.0,
                bulk_factor: 3.0,
                perishability: 0.0,
                volatility: 0.2,
                elasticity: 0.3,
                seasonal_supply: FLAT,
                seasonal_demand: FLAT,
            },
            Resource::Salt => TradeGood {
                base_price: 20.0,
                bulk_factor: 1.0,
                perishability: 0.0,
                volatility: 0.15,
                elasticity: 0.2,
                seasonal_supply: FLAT,
                seasonal_demand: WINTER_DEMAND,
            },
            Resource::Wool => TradeGood {
                base_price: 15.0,
                bulk_factor: 1.2,
                perishability: 0.05,
                volatility: 0.15,
                elasticity: 0.4,
                seasonal_supply: FLAT,
                seasonal_demand: WINTER_DEMAND,
            },
            Resource::Cloth => TradeGood {
                base_price: 40.0,
                bulk_factor: 0.8,
                perishability: 0.0,
                volatility: 0.2,
                elasticity: 0.6,
                seasonal_supply: FLAT,
                seasonal_demand: FESTIVAL_DEMAND,
            },
            Resource::Wine => TradeGood {
                base_price: 45.0,
                bulk_factor: 1.5,
                perishability: 0.2,
                volatility: 0.3,
                elasticity: 0.7,
                seasonal_supply: VINTAGE_SUPPLY,
                seasonal_demand: FESTIVAL_DEMAND,
            },
            Resource::Spices => TradeGood {
                base_price: 80.0,
                bulk_factor: 0.3,
                perishability: 0.05,
                volatility: 0.5,
                elasticity: 0.8,
                seasonal_supply: FLAT,
                seasonal_demand: FESTIVAL_DEMAND,
            },
            Resource::Gold => TradeGood {
                base_price: 150.0,
                bulk_factor: 0.5,
                perishability: 0.0,
                volatility: 0.4,
                elasticity: 0.9,
                seasonal_supply: FLAT,
                seasonal_demand: FLAT,
            },
        }
    }

    pub fn base_price(self) -> f64 {
        self.properties().base_price
    }
}
