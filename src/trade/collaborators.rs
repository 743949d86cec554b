//! Services the engine consumes from its host: region facts, the simulated clock,
//! and an outbound event channel.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::ecs::time::{MINUTES_PER_MONTH, SimTime};
use crate::model::{RegionId, Resource};

use super::events::TradeEvent;

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

pub trait RegionDirectory: Send + Sync {
    fn region_exists(&self, region: RegionId) -> bool;
    fn can_produce(&self, region: RegionId, resource: Resource) -> bool;
    fn can_receive(&self, region: RegionId, resource: Resource) -> bool;
}

#[derive(Debug, Clone, Default)]
struct RegionProfile {
    produces: BTreeSet<Resource>,
    refuses: BTreeSet<Resource>,
}

/// In-memory region directory: which regions exist, what each produces, and what
/// each refuses to import. Everything not refused can be received.
#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    regions: BTreeMap<RegionId, RegionProfile>,
}

impl RegionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_region(&mut self, region: RegionId, produces: &[Resource]) -> &mut Self {
        let profile = self.regions.entry(region).or_default();
        profile.produces.extend(produces.iter().copied());
        self
    }

    pub fn refuse(&mut self, region: RegionId, resource: Resource) -> &mut Self {
        self.regions
            .entry(region)
            .or_default()
            .refuses
            .insert(resource);
        self
    }

    pub fn regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.regions.keys().copied()
    }
}

impl RegionDirectory for RegionCatalog {
    fn region_exists(&self, region: RegionId) -> bool {
        self.regions.contains_key(&region)
    }

    fn can_produce(&self, region: RegionId, resource: Resource) -> bool {
        self.regions
            .get(&region)
            .is_some_and(|p| p.produces.contains(&resource))
    }

    fn can_receive(&self, region: RegionId, resource: Resource) -> bool {
        self.regions
            .get(&region)
            .is_some_and(|p| !p.refuses.contains(&resource))
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

pub trait TimeSource: Send + Sync {
    fn now(&self) -> SimTime;
}

/// Cloneable handle onto a single simulated time value.
///
/// The ECS clock writes into it every tick; tests drive it directly.
#[derive(Debug, Clone, Default)]
pub struct SharedClock(Arc<AtomicU32>);

impl SharedClock {
    pub fn new(start: SimTime) -> Self {
        Self(Arc::new(AtomicU32::new(start.as_minutes())))
    }

    pub fn set(&self, time: SimTime) {
        self.0.store(time.as_minutes(), Ordering::Release);
    }

    pub fn advance_minutes(&self, minutes: u32) {
        self.0.fetch_add(minutes, Ordering::AcqRel);
    }

    pub fn advance_months(&self, months: u32) {
        self.advance_minutes(months * MINUTES_PER_MONTH);
    }
}

impl TimeSource for SharedClock {
    fn now(&self) -> SimTime {
        SimTime::from_minutes(self.0.load(Ordering::Acquire))
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

pub trait TradeEventSink: Send + Sync {
    fn publish(&self, event: TradeEvent);
}

/// Buffers published events until the host drains them.
#[derive(Debug, Default)]
pub struct EventOutbox {
    pending: Mutex<Vec<TradeEvent>>,
}

impl EventOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<TradeEvent> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *pending)
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TradeEventSink for EventOutbox {
    fn publish(&self, event: TradeEvent) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_answers_region_questions() {
        let mut catalog = RegionCatalog::new();
        catalog
            .add_region(RegionId(1), &[Resource::Grain])
            .refuse(RegionId(1), Resource::Gold);

        assert!(catalog.region_exists(RegionId(1)));
        assert!(!catalog.region_exists(RegionId(2)));
        assert!(catalog.can_produce(RegionId(1), Resource::Grain));
        assert!(!catalog.can_produce(RegionId(1), Resource::Iron));
        assert!(catalog.can_receive(RegionId(1), Resource::Iron));
        assert!(!catalog.can_receive(RegionId(1), Resource::Gold));
        assert!(!catalog.can_receive(RegionId(2), Resource::Iron));
    }

    #[test]
    fn shared_clock_handles_see_the_same_time() {
        let clock = SharedClock::new(SimTime::from_year(100));
        let other = clock.clone();
        clock.advance_months(2);
        assert_eq!(other.now(), SimTime::from_year_month(100, 3));
        other.set(SimTime::from_year(101));
        assert_eq!(clock.now().year(), 101);
    }
}
