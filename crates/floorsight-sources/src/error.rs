//! Error types for source fetching
//!
//! Two families:
//! - [`PlanError`] - structural problems caught when a fetch plan is built
//! - [`SourceError`] - per-source failures at fetch time, always isolated to
//!   the failing source's result and never allowed to reject siblings

use crate::result::SourceId;

/// Structural problems in a fetch plan, rejected at build time
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Two sources registered under the same id
    #[error("duplicate source id: {0}")]
    DuplicateSource(SourceId),

    /// A declared dependency was never registered
    #[error("source {source_id} depends on unknown source {dependency}")]
    UnknownDependency {
        /// The declaring source
        source_id: SourceId,
        /// The missing dependency
        dependency: SourceId,
    },

    /// A source listed itself as a dependency
    #[error("source {0} cannot depend on itself")]
    SelfDependency(SourceId),

    /// A fan-out source must fan out over one of its own dependencies
    #[error("source {source_id} fans out over {over}, which is not among its dependencies")]
    FanOutNotADependency {
        /// The declaring source
        source_id: SourceId,
        /// The fan-out item provider
        over: SourceId,
    },

    /// The dependency graph contains a cycle
    #[error("dependency cycle detected through source {0}")]
    CycleDetected(SourceId),

    /// A plan with no sources cannot refresh anything
    #[error("fetch plan has no sources")]
    Empty,
}

/// A single source's fetch failure
///
/// Carried inside the source's own result; by policy it never propagates
/// past that boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The collaborator reported a failure (network, 4xx/5xx, server error)
    #[error("source backend error: {0}")]
    Backend(String),

    /// No response within the per-source budget
    #[error("source timed out after {timeout_ms}ms")]
    Timeout {
        /// The budget that elapsed
        timeout_ms: u64,
    },

    /// The fetch was aborted because a newer selection superseded it
    #[error("fetch cancelled by a newer selection")]
    Cancelled,

    /// A dependency settled without a usable payload
    #[error("dependency {dependency} has no committed value")]
    DependencyUnavailable {
        /// The dependency that failed or is missing
        dependency: SourceId,
    },

    /// The payload did not have the expected shape
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl SourceError {
    /// Whether a retry could plausibly succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::Timeout { .. })
    }
}
