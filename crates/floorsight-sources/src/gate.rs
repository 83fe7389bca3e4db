//! The staleness gate
//!
//! Primary cancellation mechanism of the coordinator: every settled result
//! passes through [`StalenessGate::admit`] before it may touch view state.
//! A result whose tagged generation no longer matches the store's current
//! generation is discarded - logged, counted, and otherwise ignored. This
//! makes the completion order of concurrent fetches safe to ignore even
//! when the underlying request could not be aborted.
//!
//! A discard is not an error: it is the expected, frequent outcome of rapid
//! selection churn.

use crate::result::SourceResult;
use floorsight_selection::{Generation, SelectionStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of presenting a settled result to the gate
#[derive(Debug)]
pub enum Admission {
    /// The result is current and may be committed
    Fresh(SourceResult),
    /// The result belongs to a superseded selection
    Discarded {
        /// Generation the result was tagged with at issue time
        tagged: Generation,
        /// Generation current at admission time
        current: Generation,
    },
}

impl Admission {
    /// Whether the result survived the gate
    #[inline]
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

/// Drops results whose generation has been superseded
#[derive(Debug, Clone)]
pub struct StalenessGate {
    store: Arc<SelectionStore>,
    discarded: Arc<AtomicU64>,
}

impl StalenessGate {
    /// Gate admissions against `store`'s current generation
    #[must_use]
    pub fn new(store: Arc<SelectionStore>) -> Self {
        Self {
            store,
            discarded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Admit or discard a settled result
    pub fn admit(&self, result: SourceResult) -> Admission {
        let current = self.store.generation();
        if result.generation == current {
            return Admission::Fresh(result);
        }
        self.discarded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            source = %result.source_id,
            tagged = %result.generation,
            %current,
            "discarding stale result"
        );
        Admission::Discarded {
            tagged: result.generation,
            current,
        }
    }

    /// Number of results discarded since construction
    #[inline]
    #[must_use]
    pub fn discarded_count(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}
