//! Floorsight Sources - scoped fetching and staleness protection
//!
//! This crate owns the fetch side of the coordinator:
//! - The [`SourceFetch`] collaborator contract and its request/response
//!   shapes
//! - Declarative [`FetchPlan`]s: per-source dependencies validated into a
//!   DAG and grouped into execution waves
//! - The [`Orchestrator`], which runs a plan concurrently with per-source
//!   timeouts and token-based cancellation
//! - The [`StalenessGate`], which drops results tagged with a superseded
//!   generation before they can touch view state
//! - The [`AggregateView`], the merged current-generation results of one
//!   page
//!
//! # Example
//!
//! ```rust,ignore
//! let mut builder = FetchPlanBuilder::new();
//! builder.add_source(SourceSpec::new(MACHINES, machines_api.clone()))?;
//! builder.add_source(
//!     SourceSpec::new(ALERTS, alarm_api.clone())
//!         .depends_on(MACHINES)
//!         .fan_out(MACHINES, machine_items, merge::sum_counts),
//! )?;
//! let plan = Arc::new(builder.build()?);
//!
//! let orchestrator = Orchestrator::new(plan);
//! let results = orchestrator.refresh(&selection, generation, &cancel).await;
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod fetch;
pub mod gate;
pub mod merge;
pub mod orchestrator;
pub mod plan;
pub mod result;
pub mod view;

// Re-exports for convenience
pub use error::{PlanError, SourceError};
pub use fetch::{SourceFetch, SourceRequest, SourceResponse};
pub use gate::{Admission, StalenessGate};
pub use orchestrator::{Orchestrator, DEFAULT_MAX_IN_FLIGHT, DEFAULT_TIMEOUT};
pub use plan::{FetchPlan, FetchPlanBuilder, FetchShape, SourceSpec};
pub use result::{EchoedParams, SourceId, SourceResult, SourceSummary};
pub use view::AggregateView;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
