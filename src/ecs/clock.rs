use bevy_ecs::resource::Resource;
use bevy_ecs::system::{Res, ResMut};

use super::time::{MINUTES_PER_DAY, SimTime};
use crate::trade::SharedClock;

/// Simulation clock resource tracking the current time and tick count.
///
/// Advances by `step_minutes` per tick (one day unless configured otherwise). The
/// `advance_clock` system moves the clock forward at the end of each tick (in
/// `SimPhase::Last`), so systems see the current time before it advances.
#[derive(Resource)]
pub struct SimClock {
    pub time: SimTime,
    pub tick_count: u64,
    pub step_minutes: u32,
}

impl SimClock {
    pub fn new(start_year: u32) -> Self {
        Self::with_step(start_year, MINUTES_PER_DAY)
    }

    pub fn with_step(start_year: u32, step_minutes: u32) -> Self {
        Self {
            time: SimTime::from_year(start_year),
            tick_count: 0,
            step_minutes: step_minutes.max(1),
        }
    }

    pub fn advance(&mut self) {
        self.time = self.time.plus_minutes(self.step_minutes);
        self.tick_count += 1;
    }
}

/// The engine-facing copy of the clock. Kept in step with `SimClock`.
#[derive(Resource, Clone)]
pub struct ClockHandle(pub SharedClock);

/// Bevy system that advances the simulation clock by one step and publishes the new
/// time to the engine. Registered in `SimPhase::Last`.
pub fn advance_clock(mut clock: ResMut<SimClock>, shared: Option<Res<ClockHandle>>) {
    clock.advance();
    if let Some(shared) = shared {
        shared.0.set(clock.time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::time::{MINUTES_PER_MONTH, MINUTES_PER_YEAR};
    use crate::trade::TimeSource;

    #[test]
    fn new_clock_starts_at_given_year() {
        let clock = SimClock::new(100);
        assert_eq!(clock.time.year(), 100);
        assert_eq!(clock.time.month(), 1);
        assert_eq!(clock.time.day(), 1);
        assert_eq!(clock.tick_count, 0);
        assert_eq!(clock.step_minutes, MINUTES_PER_DAY);
    }

    #[test]
    fn advance_moves_one_day() {
        let mut clock = SimClock::new(100);
        clock.advance();
        assert_eq!(clock.time.day(), 2);
        assert_eq!(clock.tick_count, 1);
    }

    #[test]
    fn advance_rolls_over_month() {
        let mut clock = SimClock::new(100);
        for _ in 0..(MINUTES_PER_MONTH / MINUTES_PER_DAY) {
            clock.advance();
        }
        assert_eq!(clock.time.month(), 2);
        assert_eq!(clock.time.day_of_month(), 1);
    }

    #[test]
    fn monthly_step_rolls_over_year() {
        let mut clock = SimClock::with_step(100, MINUTES_PER_MONTH);
        for _ in 0..12 {
            clock.advance();
        }
        assert_eq!(clock.time.year(), 101);
        assert_eq!(clock.time.as_minutes(), 101 * MINUTES_PER_YEAR);
        assert_eq!(clock.tick_count, 12);
    }

    #[test]
    fn zero_step_is_raised_to_one_minute() {
        let mut clock = SimClock::with_step(0, 0);
        clock.advance();
        assert_eq!(clock.time.as_minutes(), 1);
    }

    #[test]
    fn advance_clock_publishes_to_the_shared_handle() {
        let mut world = bevy_ecs::world::World::new();
        let shared = SharedClock::new(SimTime::from_year(3));
        world.insert_resource(SimClock::new(3));
        world.insert_resource(ClockHandle(shared.clone()));

        world.run_system_cached(advance_clock).unwrap();

        assert_eq!(shared.now(), world.resource::<SimClock>().time);
        assert_eq!(shared.now().day(), 2);
    }
}
