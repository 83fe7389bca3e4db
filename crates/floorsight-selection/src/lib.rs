//! Floorsight Selection - filter tuples and selection epochs
//!
//! The leaf crate of the coordinator stack:
//! - Strongly-typed filter identifiers (lab, machine, shift)
//! - Inclusive calendar-day windows with period-over-period helpers
//! - The [`SelectionStore`], owner of the active tuple and the
//!   monotonically increasing [`Generation`] counter used to detect and
//!   discard stale async results
//!
//! # Example
//!
//! ```rust
//! use floorsight_selection::{
//!     DateRange, LabId, Selection, SelectionPatch, SelectionStore, ShiftName,
//! };
//! use chrono::NaiveDate;
//!
//! let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
//! let store = SelectionStore::new(Selection::new(
//!     LabId::new("lab-1"),
//!     DateRange::last_days(7, today),
//! ));
//!
//! let generation = store
//!     .apply(&SelectionPatch::new().shift(Some(ShiftName::new("A"))))
//!     .expect("tuple changed");
//! assert_eq!(generation.value(), 1);
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod range;
pub mod selection;
pub mod store;

// Re-exports for convenience
pub use error::SelectionError;
pub use range::DateRange;
pub use selection::{LabId, MachineId, MachineScope, Selection, SelectionPatch, ShiftName};
pub use store::{Generation, SelectionStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
