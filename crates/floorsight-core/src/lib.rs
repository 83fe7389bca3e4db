//! Floorsight Core - the per-view aggregation coordinator
//!
//! Ties the stack together: selection store and generation counter,
//! dependency-ordered fetch orchestration, staleness gating, consistency
//! validation, fingerprinting, and the single-flight derived analysis -
//! one [`ViewCoordinator`] per dashboard view, built from a declarative
//! source list.
//!
//! # Example
//!
//! ```rust,ignore
//! let coordinator = ViewCoordinator::builder(initial_selection)
//!     .analysis_backend(insight_api)
//!     .source(SourceSpec::new(MACHINES, machines_api).summarize(machine_count))?
//!     .source(
//!         SourceSpec::new(UTILIZATION, utilization_api)
//!             .depends_on(MACHINES)
//!             .summarize(utilization),
//!     )?
//!     .build()?;
//!
//! coordinator.apply(&SelectionPatch::new().shift(Some(ShiftName::new("A"))));
//! let report = coordinator.refresh().await;
//! coordinator.trigger_analysis().await?;
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod sim;
pub mod views;

// Re-exports for convenience
pub use config::CoordinatorConfig;
pub use coordinator::{ComparisonReport, CoordinatorBuilder, RefreshReport, ViewCoordinator};
pub use error::CoordinatorError;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving a view coordinator
    pub use crate::{
        CoordinatorBuilder, CoordinatorConfig, CoordinatorError, RefreshReport, ViewCoordinator,
    };
    pub use floorsight_insight::{AnalysisBackend, AnalysisState, TriggerOutcome};
    pub use floorsight_selection::{
        DateRange, LabId, MachineId, Selection, SelectionPatch, ShiftName,
    };
    pub use floorsight_sources::{SourceFetch, SourceId, SourceSpec};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
