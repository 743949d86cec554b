use bevy_ecs::system::Res;

use super::clock::SimClock;
use super::time::{MINUTES_PER_DAY, MINUTES_PER_MONTH, MINUTES_PER_YEAR, SimTime};

// Internal check functions for testability.
//
// A period boundary fires on the tick whose step `(time - step, time]` contains it, so
// coarse steps never skip a month or year. With a one-minute step this reduces to
// `time % period == 0`.

fn crossed(time: SimTime, step: u32, period: u32) -> bool {
    time.as_minutes() % period < step.max(1)
}

fn yearly_check(time: SimTime, step: u32) -> bool {
    crossed(time, step, MINUTES_PER_YEAR)
}

fn monthly_check(time: SimTime, step: u32) -> bool {
    crossed(time, step, MINUTES_PER_MONTH)
}

fn daily_check(time: SimTime, step: u32) -> bool {
    crossed(time, step, MINUTES_PER_DAY)
}

// Bevy run condition functions (for use with `.run_if()`).

pub fn yearly(clock: Res<SimClock>) -> bool {
    yearly_check(clock.time, clock.step_minutes)
}

pub fn monthly(clock: Res<SimClock>) -> bool {
    monthly_check(clock.time, clock.step_minutes)
}

pub fn daily(clock: Res<SimClock>) -> bool {
    daily_check(clock.time, clock.step_minutes)
}
