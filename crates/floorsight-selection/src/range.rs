//! Inclusive calendar-day windows
//!
//! All scoped queries run over a [`DateRange`] — an inclusive pair of
//! calendar days. Windows are compared and fingerprinted by their canonical
//! `YYYY-MM-DD` rendering, so no time-of-day or timezone component is kept.

use crate::error::SelectionError;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// An inclusive window of calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Create a range from inclusive bounds
    ///
    /// # Errors
    /// Returns [`SelectionError::InvalidRange`] if `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, SelectionError> {
        if start > end {
            return Err(SelectionError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Range covering a single day
    #[inline]
    #[must_use]
    pub const fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// The trailing `days`-day window ending at `today` (inclusive)
    ///
    /// `last_days(7, today)` spans the six preceding days plus `today`,
    /// matching the dashboard's "Last 7 Days" default.
    #[must_use]
    pub fn last_days(days: u64, today: NaiveDate) -> Self {
        let span = days.max(1);
        let start = today
            .checked_sub_days(Days::new(span - 1))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end: today }
    }

    /// Inclusive start day
    #[inline]
    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    /// Inclusive end day
    #[inline]
    #[must_use]
    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days covered, counting both bounds
    #[inline]
    #[must_use]
    pub fn num_days(&self) -> u64 {
        (self.end - self.start).num_days() as u64 + 1
    }

    /// Whether `day` falls inside the window
    #[inline]
    #[must_use]
    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    /// The window of identical length immediately preceding this one
    ///
    /// Ends the day before `start`; used for period-over-period comparison.
    #[must_use]
    pub fn previous_period(&self) -> Self {
        let len = self.num_days();
        let end = self
            .start
            .checked_sub_days(Days::new(1))
            .unwrap_or(NaiveDate::MIN);
        let start = end
            .checked_sub_days(Days::new(len - 1))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
