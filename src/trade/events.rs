use std::collections::BTreeMap;

use bevy_ecs::message::Message;
use serde::{Deserialize, Serialize};

use super::calculator::RevenueImpact;
use crate::ecs::time::SimTime;
use crate::model::{HubKind, PriceTrend, RegionId, Resource, RouteId, RouteKind};

/// State changes published after commit, for consumers outside the engine.
///
/// Payloads carry ids and computed metrics, never internal records.
#[derive(Message, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TradeEvent {
    RouteEstablished {
        route: RouteId,
        kind: RouteKind,
        distance_km: f64,
        profitability: f64,
        expected_monthly_profit: f64,
        at: SimTime,
    },
    RouteDisrupted {
        route: RouteId,
        cause: String,
        duration_months: f64,
        renewal: bool,
        impact: RevenueImpact,
        at: SimTime,
    },
    RouteRecoveryStarted {
        route: RouteId,
        recovery_months: f64,
        at: SimTime,
    },
    RouteRecoveryComplete {
        route: RouteId,
        restored_volume: f64,
        restored_safety: f64,
        at: SimTime,
    },
    RouteAbandoned {
        route: RouteId,
        reason: String,
        lifetime_profit: f64,
        total_goods_moved: f64,
        at: SimTime,
    },
    HubEvolved {
        region: RegionId,
        old_kind: Option<HubKind>,
        new_kind: HubKind,
        level: u8,
        capacity: f64,
        specializations: Vec<Resource>,
        trigger: String,
        at: SimTime,
    },
    PriceShock {
        region: RegionId,
        resource: Resource,
        old_price: f64,
        new_price: f64,
        magnitude: f64,
        trend: PriceTrend,
        cause: String,
        duration_months: u32,
        at: SimTime,
    },
    VolumeChanged {
        route: RouteId,
        old_volume: f64,
        new_volume: f64,
        percent_change: f64,
        reason: String,
        at: SimTime,
    },
    MarketConditionsChanged {
        region: RegionId,
        price_changes: BTreeMap<Resource, f64>,
        supply_changes: BTreeMap<Resource, f64>,
        demand_changes: BTreeMap<Resource, f64>,
        cause: String,
        at: SimTime,
    },
}

impl TradeEvent {
    pub fn label(&self) -> &'static str {
        match self {
            TradeEvent::RouteEstablished { .. } => "route_established",
            TradeEvent::RouteDisrupted { .. } => "route_disrupted",
            TradeEvent::RouteRecoveryStarted { .. } => "route_recovery_started",
            TradeEvent::RouteRecoveryComplete { .. } => "route_recovery_complete",
            TradeEvent::RouteAbandoned { .. } => "route_abandoned",
            TradeEvent::HubEvolved { .. } => "hub_evolved",
            TradeEvent::PriceShock { .. } => "price_shock",
            TradeEvent::VolumeChanged { .. } => "volume_changed",
            TradeEvent::MarketConditionsChanged { .. } => "market_conditions_changed",
        }
    }

    pub fn at(&self) -> SimTime {
        match self {
            TradeEvent::RouteEstablished { at, .. }
            | TradeEvent::RouteDisrupted { at, .. }
            | TradeEvent::RouteRecoveryStarted { at, .. }
            | TradeEvent::RouteRecoveryComplete { at, .. }
            | TradeEvent::RouteAbandoned { at, .. }
            | TradeEvent::HubEvolved { at, .. }
            | TradeEvent::PriceShock { at, .. }
            | TradeEvent::VolumeChanged { at, .. }
            | TradeEvent::MarketConditionsChanged { at, .. } => *at,
        }
    }

    pub fn route(&self) -> Option<RouteId> {
        match self {
            TradeEvent::RouteEstablished { route, .. }
            | TradeEvent::RouteDisrupted { route, .. }
            | TradeEvent::RouteRecoveryStarted { route, .. }
            | TradeEvent::RouteRecoveryComplete { route, .. }
            | TradeEvent::RouteAbandoned { route, .. }
            | TradeEvent::VolumeChanged { route, .. } => Some(*route),
            _ => None,
        }
    }

    /// One-line human-readable summary.
    pub fn describe(&self) -> String {
        match self {
            TradeEvent::RouteEstablished {
                route,
                kind,
                expected_monthly_profit,
                ..
            } => format!("{route} opened as a {kind} route ({expected_monthly_profit:.1}/month)"),
            TradeEvent::RouteDisrupted {
                route,
                cause,
                duration_months,
                renewal,
                ..
            } => {
                if *renewal {
                    format!("{route} disruption extended by {duration_months} months")
                } else {
                    format!("{route} disrupted by {cause} for {duration_months} months")
                }
            }
            TradeEvent::RouteRecoveryStarted {
                route,
                recovery_months,
                ..
            } => format!("{route} recovering over {recovery_months:.1} months"),
            TradeEvent::RouteRecoveryComplete { route, .. } => format!("{route} fully recovered"),
            TradeEvent::RouteAbandoned { route, reason, .. } => {
                format!("{route} abandoned ({reason})")
            }
            TradeEvent::HubEvolved {
                region,
                new_kind,
                level,
                ..
            } => format!("hub at region {region} is now a level {level} {new_kind}"),
            TradeEvent::PriceShock {
                region,
                resource,
                old_price,
                new_price,
                cause,
                ..
            } => format!(
                "{resource} at region {region} moved {old_price:.2} -> {new_price:.2} ({cause})"
            ),
            TradeEvent::VolumeChanged {
                route,
                percent_change,
                reason,
                ..
            } => format!("{route} volume changed {percent_change:+.1}% ({reason})"),
            TradeEvent::MarketConditionsChanged {
                region,
                price_changes,
                ..
            } => format!(
                "{} markets at region {region} moved",
                price_changes.len()
            ),
        }
    }
}
