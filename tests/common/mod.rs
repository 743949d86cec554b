#![allow(dead_code)]

use std::sync::Arc;

use trade_sim::ecs::SimTime;
use trade_sim::model::{LinkSpec, RegionGraph, RegionId, Resource};
use trade_sim::trade::{EventOutbox, RegionCatalog, SharedClock, TradeConfig, TradeEngine, TradeEvent};

pub const ARDEN: RegionId = RegionId(1);
pub const BRASK: RegionId = RegionId(2);
pub const CORVEL: RegionId = RegionId(3);
pub const DUNMERE: RegionId = RegionId(4);
pub const ESTUARY: RegionId = RegionId(5);
pub const FARHOLD: RegionId = RegionId(6);
pub const ISOLATED: RegionId = RegionId(9);

/// Six linked regions and one with no links at all.
///
/// ```text
///   Arden ──210── Brask ══210══ Corvel ──220── Farhold
///     │ (pass)     │              ┆ coast
///    300          220            230
///     │            │              ┆
///   Dunmere ┄┄┄┄┄┄┄┄┄┄┄┄ 220 ┄┄┄ Estuary
/// ```
/// `══` is a river, `┄` a coast, and Arden–Dunmere crosses a mountain pass.
pub fn build_test_map() -> RegionGraph {
    let mut graph = RegionGraph::new();
    graph.add_region(ARDEN, "Arden", (0.0, 0.0));
    graph.add_region(BRASK, "Brask", (200.0, 0.0));
    graph.add_region(CORVEL, "Corvel", (400.0, 0.0));
    graph.add_region(DUNMERE, "Dunmere", (200.0, 200.0));
    graph.add_region(ESTUARY, "Estuary", (400.0, 200.0));
    graph.add_region(FARHOLD, "Farhold", (600.0, 0.0));
    graph.add_region(ISOLATED, "Isolated", (2000.0, 2000.0));

    let land = |km: f64| LinkSpec {
        distance_km: km,
        ..LinkSpec::default()
    };
    graph.connect(ARDEN, BRASK, land(210.0));
    graph.connect(
        BRASK,
        CORVEL,
        LinkSpec {
            river: true,
            ..land(210.0)
        },
    );
    graph.connect(CORVEL, FARHOLD, land(220.0));
    graph.connect(
        ARDEN,
        DUNMERE,
        LinkSpec {
            mountain_pass: true,
            safety: 0.8,
            ..land(300.0)
        },
    );
    graph.connect(BRASK, DUNMERE, land(220.0));
    graph.connect(
        DUNMERE,
        ESTUARY,
        LinkSpec {
            coastal: true,
            ..land(220.0)
        },
    );
    graph.connect(
        CORVEL,
        ESTUARY,
        LinkSpec {
            coastal: true,
            ..land(230.0)
        },
    );
    graph
}

/// Arden mines iron and grows grain, Brask boils salt, Estuary fishes, Farhold weaves.
/// Farhold refuses fish.
pub fn build_test_catalog() -> RegionCatalog {
    let mut catalog = RegionCatalog::new();
    catalog
        .add_region(ARDEN, &[Resource::Iron, Resource::Grain])
        .add_region(BRASK, &[Resource::Salt])
        .add_region(CORVEL, &[])
        .add_region(DUNMERE, &[])
        .add_region(ESTUARY, &[Resource::Fish])
        .add_region(FARHOLD, &[Resource::Cloth])
        .add_region(ISOLATED, &[Resource::Gold])
        .refuse(FARHOLD, Resource::Fish);
    catalog
}

/// Defaults with random market shocks and route hazards switched off.
pub fn quiet_config() -> TradeConfig {
    let mut config = TradeConfig::default();
    config.market.shock_chance = 0.0;
    config.scheduler.hazard_chance = 0.0;
    config
}

pub struct TestEngine {
    pub engine: Arc<TradeEngine>,
    pub clock: SharedClock,
    pub outbox: Arc<EventOutbox>,
}

impl TestEngine {
    pub fn drain(&self) -> Vec<TradeEvent> {
        self.outbox.drain()
    }

    pub fn count(&self, events: &[TradeEvent], label: &str) -> usize {
        events.iter().filter(|e| e.label() == label).count()
    }
}

/// An engine over the test map, starting in June of year 1.
pub fn build_engine(config: TradeConfig) -> TestEngine {
    let clock = SharedClock::new(SimTime::from_year_month(1, 6));
    let outbox = Arc::new(EventOutbox::new());
    let engine = TradeEngine::new(
        config,
        build_test_map(),
        Arc::new(build_test_catalog()),
        Arc::new(clock.clone()),
        outbox.clone(),
    )
    .unwrap();
    TestEngine {
        engine: Arc::new(engine),
        clock,
        outbox,
    }
}

pub fn read_lines(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}
