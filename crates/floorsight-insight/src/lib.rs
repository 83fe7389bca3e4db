//! Floorsight Insight - freshness validation and the derived analysis
//!
//! The decision layer of the coordinator:
//! - [`consistency`]: re-checks every committed result's echoed parameters
//!   against the live selection, the last line of defense before a derived
//!   computation
//! - [`fingerprint`]: deterministic Blake3 digests over selection + result
//!   summaries, used to invalidate the derived artifact
//! - [`analysis`]: the single-flight [`AnalysisGate`] around the expensive
//!   analysis collaborator, supporting full-document and streamed responses

#![warn(unreachable_pub)]

pub mod analysis;
pub mod consistency;
pub mod error;
pub mod fingerprint;

// Re-exports for convenience
pub use analysis::{
    AnalysisBackend, AnalysisGate, AnalysisRequest, AnalysisResponse, AnalysisState,
    TriggerContext, TriggerOutcome,
};
pub use consistency::{validate, Field, Mismatch};
pub use error::AnalysisError;
pub use fingerprint::{fingerprint, Fingerprint};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
