use bevy_app::App;

use crate::ecs::clock::SimClock;
use crate::ecs::resources::{EventLog, TradeEngineHandle};
use crate::ecs::schedule::SimTick;
use crate::ecs::time::{MINUTES_PER_MONTH, MINUTES_PER_YEAR};

fn ticks_for(app: &App, minutes: u32) -> u32 {
    let step = app.world().resource::<SimClock>().step_minutes;
    minutes.div_ceil(step)
}

/// Run one tick of the schedule.
pub fn tick(app: &mut App) {
    app.world_mut().run_schedule(SimTick);
}

/// Run enough ticks to span `n` months at the app's step size.
pub fn tick_months(app: &mut App, n: u32) {
    for _ in 0..ticks_for(app, n * MINUTES_PER_MONTH) {
        tick(app);
    }
}

/// Run enough ticks to span `n` years at the app's step size.
pub fn tick_years(app: &mut App, n: u32) {
    for _ in 0..ticks_for(app, n * MINUTES_PER_YEAR) {
        tick(app);
    }
}

/// Return the current simulation year from the clock resource.
pub fn current_year(app: &App) -> u32 {
    app.world().resource::<SimClock>().time.year()
}

/// Count logged events of one kind.
pub fn logged(app: &App, kind: &str) -> usize {
    app.world().resource::<EventLog>().of_kind(kind).count()
}

pub fn engine(app: &App) -> std::sync::Arc<crate::trade::TradeEngine> {
    app.world().resource::<TradeEngineHandle>().0.clone()
}
