use std::fmt;

use serde::{Deserialize, Serialize};

// Calendar constants: 30-day months, 360-day years.
pub const MINUTES_PER_HOUR: u32 = 60;
pub const HOURS_PER_DAY: u32 = 24;
pub const DAYS_PER_MONTH: u32 = 30;
pub const MONTHS_PER_YEAR: u32 = 12;
pub const DAYS_PER_YEAR: u32 = 360;

pub const MINUTES_PER_DAY: u32 = MINUTES_PER_HOUR * HOURS_PER_DAY; // 1,440
pub const MINUTES_PER_MONTH: u32 = MINUTES_PER_DAY * DAYS_PER_MONTH; // 43,200
pub const MINUTES_PER_YEAR: u32 = MINUTES_PER_DAY * DAYS_PER_YEAR; // 518,400

/// Simulation time as total elapsed minutes since year 0.
///
/// Calendar accessors are derived by division. Natural `u32` ordering is
/// chronological ordering.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(u32);

impl SimTime {
    pub fn from_minutes(minutes: u32) -> Self {
        Self(minutes)
    }

    /// Start of a year (day 1, 00:00).
    pub fn from_year(year: u32) -> Self {
        Self(year * MINUTES_PER_YEAR)
    }

    /// First minute of a month (1-indexed) within a year.
    pub fn from_year_month(year: u32, month: u32) -> Self {
        debug_assert!(
            (1..=MONTHS_PER_YEAR).contains(&month),
            "month out of range: {month}"
        );
        Self(year * MINUTES_PER_YEAR + (month - 1) * MINUTES_PER_MONTH)
    }

    pub fn as_minutes(self) -> u32 {
        self.0
    }

    pub fn year(self) -> u32 {
        self.0 / MINUTES_PER_YEAR
    }

    /// Day of year (1–360).
    pub fn day(self) -> u32 {
        (self.0 % MINUTES_PER_YEAR) / MINUTES_PER_DAY + 1
    }

    /// Month of year (1–12).
    pub fn month(self) -> u32 {
        (self.day() - 1) / DAYS_PER_MONTH + 1
    }

    /// Day within the month (1–30).
    pub fn day_of_month(self) -> u32 {
        (self.day() - 1) % DAYS_PER_MONTH + 1
    }

    pub fn is_year_start(self) -> bool {
        self.0.is_multiple_of(MINUTES_PER_YEAR)
    }

    pub fn is_month_start(self) -> bool {
        self.0.is_multiple_of(MINUTES_PER_MONTH)
    }

    pub fn is_day_start(self) -> bool {
        self.0.is_multiple_of(MINUTES_PER_DAY)
    }

    /// Months 12, 1 and 2.
    pub fn is_winter(self) -> bool {
        matches!(self.month(), 12 | 1 | 2)
    }

    /// Whole months elapsed between `earlier` and `self` (saturating).
    pub fn months_since(self, earlier: SimTime) -> u32 {
        (self.0 / MINUTES_PER_MONTH).saturating_sub(earlier.0 / MINUTES_PER_MONTH)
    }

    /// Fractional months elapsed between `earlier` and `self` (0 if `earlier` is later).
    pub fn fractional_months_since(self, earlier: SimTime) -> f64 {
        self.0.saturating_sub(earlier.0) as f64 / MINUTES_PER_MONTH as f64
    }

    /// This time shifted forward by a (possibly fractional) number of months.
    pub fn plus_months(self, months: f64) -> SimTime {
        let minutes = (months.max(0.0) * MINUTES_PER_MONTH as f64).round();
        Self(self.0.saturating_add(minutes as u32))
    }

    pub fn plus_minutes(self, minutes: u32) -> SimTime {
        Self(self.0.saturating_add(minutes))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Y{}.M{}.D{}", self.year(), self.month(), self.day_of_month())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_derivation() {
        let t = SimTime::from_year_month(10, 7);
        assert_eq!(t.year(), 10);
        assert_eq!(t.month(), 7);
        assert_eq!(t.day_of_month(), 1);
        assert!(t.is_month_start());
        assert!(!t.is_year_start());
    }

    #[test]
    fn winter_months() {
        assert!(SimTime::from_year_month(1, 12).is_winter());
        assert!(SimTime::from_year_month(1, 1).is_winter());
        assert!(SimTime::from_year_month(1, 2).is_winter());
        assert!(!SimTime::from_year_month(1, 3).is_winter());
        assert!(!SimTime::from_year_month(1, 7).is_winter());
    }

    #[test]
    fn fractional_months_and_shift_agree() {
        let start = SimTime::from_year_month(100, 3);
        let later = start.plus_months(2.5);
        assert!((later.fractional_months_since(start) - 2.5).abs() < 1e-9);
        assert_eq!(later.months_since(start), 2);
        assert_eq!(start.fractional_months_since(later), 0.0);
    }

    #[test]
    fn months_since_crosses_years() {
        let a = SimTime::from_year_month(100, 3);
        let c = SimTime::from_year_month(101, 2);
        assert_eq!(c.months_since(a), 11);
        assert_eq!(a.months_since(c), 0);
    }

    #[test]
    fn display_format() {
        assert_eq!(SimTime::from_year_month(125, 4).to_string(), "Y125.M4.D1");
    }

    #[test]
    fn serializes_as_minutes() {
        let t = SimTime::from_minutes(43_200);
        assert_eq!(serde_json::to_string(&t).unwrap(), "43200");
    }

    #[test]
    fn constants_are_consistent() {
        assert_eq!(MINUTES_PER_MONTH, MINUTES_PER_DAY * DAYS_PER_MONTH);
        assert_eq!(MINUTES_PER_YEAR, MINUTES_PER_DAY * DAYS_PER_YEAR);
        assert_eq!(DAYS_PER_YEAR, DAYS_PER_MONTH * MONTHS_PER_YEAR);
    }
}
