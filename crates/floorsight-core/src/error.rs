//! Error types for the view coordinator

use floorsight_insight::AnalysisError;
use floorsight_selection::SelectionError;
use floorsight_sources::PlanError;

/// Failures building or driving a view coordinator
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// The declared source set is structurally invalid
    #[error("invalid fetch plan: {0}")]
    Plan(#[from] PlanError),

    /// The selection update was invalid
    #[error("invalid selection: {0}")]
    Selection(#[from] SelectionError),

    /// The derived analysis failed or was not permitted
    #[error("analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// A coordinator needs an analysis backend to gate
    #[error("no analysis backend configured")]
    MissingBackend,
}
