use thiserror::Error;

use crate::model::{RegionId, Resource, RouteId, RouteStatus};

/// Coarse failure category, for callers that only branch on the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    State,
    NotFound,
}

/// Input rejected before any state was touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("source and destination are the same region ({0})")]
    SameRegion(RegionId),

    #[error("unknown region {0}")]
    UnknownRegion(RegionId),

    #[error("region {region} cannot produce {resource}")]
    CannotProduce { region: RegionId, resource: Resource },

    #[error("region {region} cannot receive {resource}")]
    CannotReceive { region: RegionId, resource: Resource },

    #[error("no viable path from {from} to {to}")]
    NoViablePath { from: RegionId, to: RegionId },

    #[error("profitability {profitability:.3} is below the viability threshold {threshold:.3}")]
    Unprofitable { profitability: f64, threshold: f64 },

    #[error("route safety {safety:.3} is below the viability threshold {threshold:.3}")]
    Unsafe { safety: f64, threshold: f64 },

    #[error("route efficiency {0} is outside (0, 1]")]
    InvalidEfficiency(f64),

    #[error("no market price for {resource} at {region}")]
    NoPrice { region: RegionId, resource: Resource },

    #[error("disruption duration must be a positive number of months, got {0}")]
    InvalidDuration(f64),

    #[error("hub level {0} is outside 1..=5")]
    InvalidHubLevel(u8),

    #[error("hub at {region} is level {current}; {requested} is not an upgrade")]
    NotAnUpgrade {
        region: RegionId,
        current: u8,
        requested: u8,
    },

    #[error("price shock magnitude {0} must be finite and greater than -1")]
    InvalidShock(f64),

    #[error("malformed route record {route}: {reason}")]
    MalformedRoute { route: RouteId, reason: String },
}

/// Failure of a trade engine operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TradeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("route {route} is {status}; cannot {operation}")]
    InvalidState {
        route: RouteId,
        status: RouteStatus,
        operation: &'static str,
    },

    #[error("route {route} is already disrupted; cause `{cause}` is not a renewal")]
    AlreadyDisrupted { route: RouteId, cause: String },

    #[error("route {0} already exists")]
    RouteExists(RouteId),

    #[error("route {route} changed while the update was being computed (revision {expected} -> {found})")]
    Conflict {
        route: RouteId,
        expected: u64,
        found: u64,
    },

    #[error("a hub already exists at region {0}")]
    HubExists(RegionId),

    #[error("route {0} not found")]
    RouteNotFound(RouteId),

    #[error("no hub at region {0}")]
    HubNotFound(RegionId),

    #[error("region {0} not found")]
    RegionNotFound(RegionId),
}

impl TradeError {
    /// Lost races (`RouteExists`, `Conflict`) report as state failures.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TradeError::Validation(_) => ErrorKind::Validation,
            TradeError::InvalidState { .. }
            | TradeError::AlreadyDisrupted { .. }
            | TradeError::RouteExists(_)
            | TradeError::Conflict { .. }
            | TradeError::HubExists(_) => ErrorKind::State,
            TradeError::RouteNotFound(_)
            | TradeError::HubNotFound(_)
            | TradeError::RegionNotFound(_) => ErrorKind::NotFound,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, TradeError::RouteExists(_) | TradeError::Conflict { .. })
    }
}
