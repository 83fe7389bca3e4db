//! Error types for selection handling

use chrono::NaiveDate;

/// Errors produced while building or updating selections
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    /// Date range bounds are inverted
    #[error("invalid date range: {start} is after {end}")]
    InvalidRange {
        /// Requested start day
        start: NaiveDate,
        /// Requested end day
        end: NaiveDate,
    },
}
