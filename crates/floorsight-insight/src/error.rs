//! Error types for the insight layer

use crate::consistency::Mismatch;
use floorsight_sources::SourceId;

/// Failures around the derived analysis
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    /// Required sources are missing, failed, or not at the current
    /// generation
    #[error("required sources not ready: {}", format_ids(.missing))]
    NotReady {
        /// Sources without a committed, error-free, current-generation value
        missing: Vec<SourceId>,
    },

    /// Committed data echoes parameters that disagree with the active
    /// selection - data may be stale, retry after the next refresh
    #[error("view disagrees with the active selection on {n} field(s)", n = .mismatches.len())]
    Inconsistent {
        /// Every disagreeing field, reported as a list
        mismatches: Vec<Mismatch>,
    },

    /// The analysis collaborator failed
    #[error("analysis backend error: {0}")]
    Backend(String),

    /// A streamed analysis aborted before its end marker
    #[error("analysis stream aborted: {0}")]
    Stream(String),
}

impl AnalysisError {
    /// Whether this is a precondition failure (retry after refresh) rather
    /// than a backend failure
    #[inline]
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::NotReady { .. } | Self::Inconsistent { .. })
    }
}

fn format_ids(ids: &[SourceId]) -> String {
    ids.iter()
        .map(SourceId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_lists_sources() {
        let err = AnalysisError::NotReady {
            missing: vec![SourceId::new("machines"), SourceId::new("utilization")],
        };
        assert_eq!(
            err.to_string(),
            "required sources not ready: machines, utilization"
        );
        assert!(err.is_precondition());
    }

    #[test]
    fn backend_error_is_not_precondition() {
        assert!(!AnalysisError::Backend("503".into()).is_precondition());
    }
}
