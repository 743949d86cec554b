use bevy_ecs::resource::Resource;
use serde::{Deserialize, Serialize};

use crate::ecs::time::SimTime;
use crate::model::RouteId;
use crate::trade::TradeEvent;

/// A trade event as recorded by the host, with a log-wide id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub id: u64,
    pub kind: String,
    pub timestamp: SimTime,
    pub description: String,
    pub route: Option<RouteId>,
    pub event: TradeEvent,
}

impl LoggedEvent {
    pub fn new(id: u64, event: TradeEvent) -> Self {
        Self {
            id,
            kind: event.label().to_string(),
            timestamp: event.at(),
            description: event.describe(),
            route: event.route(),
            event,
        }
    }
}

/// Accumulates relayed events between flushes and hands out their ids.
///
/// Ids start at 1 and keep counting across flushes, so an appended events file never
/// repeats one.
#[derive(Resource, Debug, Clone, Default)]
pub struct EventLog {
    pub events: Vec<LoggedEvent>,
    last_id: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty log that continues numbering after the highest id already written.
    pub fn resuming_after(written: &[LoggedEvent]) -> Self {
        Self {
            events: Vec::new(),
            last_id: written.iter().map(|e| e.id).max().unwrap_or(0),
        }
    }

    /// Append an event under the next id and return that id.
    pub fn record(&mut self, event: TradeEvent) -> u64 {
        self.last_id += 1;
        self.events.push(LoggedEvent::new(self.last_id, event));
        self.last_id
    }

    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events of one kind, in the order they were logged.
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a LoggedEvent> + 'a {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// Drop the buffered events. The id counter keeps its place.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RegionId, Resource};

    #[test]
    fn logged_event_copies_label_time_and_route() {
        let route = RouteId::new(RegionId(1), RegionId(2), Resource::Salt);
        let at = SimTime::from_year_month(4, 3);
        let logged = LoggedEvent::new(
            7,
            TradeEvent::RouteRecoveryStarted {
                route,
                recovery_months: 2.0,
                at,
            },
        );
        assert_eq!(logged.id, 7);
        assert_eq!(logged.kind, "route_recovery_started");
        assert_eq!(logged.timestamp, at);
        assert_eq!(logged.route, Some(route));
        assert!(!logged.description.is_empty());
    }

    fn recovery_event(at: SimTime) -> TradeEvent {
        TradeEvent::RouteRecoveryStarted {
            route: RouteId::new(RegionId(1), RegionId(2), Resource::Salt),
            recovery_months: 1.0,
            at,
        }
    }

    #[test]
    fn ids_keep_counting_across_clears() {
        let mut log = EventLog::new();
        assert_eq!(log.record(recovery_event(SimTime::default())), 1);
        assert_eq!(log.record(recovery_event(SimTime::default())), 2);
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.record(recovery_event(SimTime::default())), 3);
        assert_eq!(log.events[0].id, 3);
    }

    #[test]
    fn resumed_log_continues_after_the_highest_written_id() {
        let written = vec![
            LoggedEvent::new(4, recovery_event(SimTime::default())),
            LoggedEvent::new(9, recovery_event(SimTime::default())),
        ];
        let mut log = EventLog::resuming_after(&written);
        assert!(log.is_empty());
        assert_eq!(log.last_id(), 9);
        assert_eq!(log.record(recovery_event(SimTime::default())), 10);

        assert_eq!(EventLog::resuming_after(&[]).last_id(), 0);
    }
}
