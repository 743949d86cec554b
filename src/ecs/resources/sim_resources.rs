use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use bevy_ecs::resource::Resource;
use bevy_ecs::world::World;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::ecs::time::MINUTES_PER_DAY;
use crate::trade::{EventOutbox, TradeEngine};

/// Host settings: where the clock starts, how far it moves per tick, and the seed.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub start_year: u32,
    pub seed: u64,
    pub step_minutes: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_year: 0,
            seed: 42,
            step_minutes: MINUTES_PER_DAY,
        }
    }
}

/// Deterministic RNG for the simulation.
#[derive(Resource)]
pub struct SimRng {
    pub rng: SmallRng,
    pub seed: u64,
}

// ---------------------------------------------------------------------------
// Per-domain RNG resources
// ---------------------------------------------------------------------------

macro_rules! domain_rng {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Resource)]
        pub struct $name(pub SmallRng);

        impl Default for $name {
            fn default() -> Self {
                Self(SmallRng::seed_from_u64(0))
            }
        }
    };
}

domain_rng!(MarketRng, "Per-domain RNG for market shocks.");
domain_rng!(HazardRng, "Per-domain RNG for route hazards.");

/// Derive a deterministic per-domain seed from the global seed, domain name, and tick count.
fn derive_domain_seed(seed: u64, domain: &str, tick: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    domain.hash(&mut hasher);
    tick.hash(&mut hasher);
    hasher.finish()
}

/// Exclusive system that re-seeds all per-domain RNGs each tick.
/// Runs in `SimPhase::PreUpdate` before any trade systems.
pub fn distribute_rng(world: &mut World) {
    let seed = world.resource::<SimRng>().seed;
    let tick = world.resource::<crate::ecs::clock::SimClock>().tick_count;

    macro_rules! reseed {
        ($res:ty, $label:expr) => {
            world.resource_mut::<$res>().0 =
                SmallRng::seed_from_u64(derive_domain_seed(seed, $label, tick));
        };
    }

    reseed!(MarketRng, "market");
    reseed!(HazardRng, "hazard");
}

/// The engine shared between systems and anything outside the app.
#[derive(Resource, Clone)]
pub struct TradeEngineHandle(pub Arc<TradeEngine>);

/// The outbox the engine publishes into. Drained by the relay system each tick.
#[derive(Resource, Clone)]
pub struct OutboxHandle(pub Arc<EventOutbox>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_seeds_differ_by_domain_and_tick() {
        let a = derive_domain_seed(42, "market", 1);
        assert_eq!(a, derive_domain_seed(42, "market", 1));
        assert_ne!(a, derive_domain_seed(42, "hazard", 1));
        assert_ne!(a, derive_domain_seed(42, "market", 2));
        assert_ne!(a, derive_domain_seed(43, "market", 1));
    }

    #[test]
    fn default_config_steps_one_day() {
        let config = SimConfig::default();
        assert_eq!(config.step_minutes, MINUTES_PER_DAY);
        let parsed: SimConfig = serde_json::from_str(r#"{"seed": 9}"#).unwrap();
        assert_eq!(parsed.seed, 9);
        assert_eq!(parsed.start_year, 0);
    }
}
