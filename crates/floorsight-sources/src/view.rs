//! The merged, current-generation view state
//!
//! An [`AggregateView`] holds the committed results relevant to one page.
//! It is mutated only by committing fresh results; a failed source records
//! its own error without touching siblings, and nothing is ever partially
//! rolled back.

use crate::error::SourceError;
use crate::result::{SourceId, SourceResult, SourceSummary};
use dashmap::DashMap;
use floorsight_selection::Generation;
use serde_json::Value;
use std::collections::BTreeMap;

/// Merged source results for one view
#[derive(Debug, Default)]
pub struct AggregateView {
    committed: DashMap<SourceId, SourceResult>,
}

impl AggregateView {
    /// Empty view
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a settled result, replacing any earlier one for that source
    pub fn commit(&self, result: SourceResult) {
        self.committed.insert(result.source_id, result);
    }

    /// The committed result for a source, if any
    #[must_use]
    pub fn get(&self, id: SourceId) -> Option<SourceResult> {
        self.committed.get(&id).map(|entry| entry.value().clone())
    }

    /// The committed payload for a source, if it settled successfully
    #[must_use]
    pub fn payload(&self, id: SourceId) -> Option<Value> {
        self.committed
            .get(&id)
            .and_then(|entry| entry.payload.clone())
    }

    /// Whether a source holds a successful result at `generation`
    #[must_use]
    pub fn is_fresh(&self, id: SourceId, generation: Generation) -> bool {
        self.committed
            .get(&id)
            .is_some_and(|entry| entry.is_success() && entry.generation == generation)
    }

    /// All committed results, in source-id order
    #[must_use]
    pub fn results(&self) -> Vec<SourceResult> {
        let mut results: Vec<SourceResult> = self
            .committed
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        results.sort_by_key(|r| r.source_id);
        results
    }

    /// Numeric summaries of every successful source, in canonical order
    #[must_use]
    pub fn summaries(&self) -> BTreeMap<SourceId, SourceSummary> {
        self.committed
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .summary
                    .clone()
                    .map(|summary| (entry.value().source_id, summary))
            })
            .collect()
    }

    /// Per-source errors currently committed, in source-id order
    #[must_use]
    pub fn errors(&self) -> Vec<(SourceId, SourceError)> {
        let mut errors: Vec<(SourceId, SourceError)> = self
            .committed
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .error
                    .clone()
                    .map(|error| (entry.value().source_id, error))
            })
            .collect();
        errors.sort_by_key(|(id, _)| *id);
        errors
    }

    /// Number of committed sources
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.committed.len()
    }

    /// Whether nothing is committed yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    /// Drop every committed result (e.g. on a lab switch)
    pub fn clear(&self) {
        self.committed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::EchoedParams;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const MACHINES: SourceId = SourceId::new("machines");
    const SHIFTS: SourceId = SourceId::new("shifts");

    fn success(id: SourceId, generation: Generation, payload: Value) -> SourceResult {
        SourceResult::success(generation, id, payload, None, EchoedParams::none())
    }

    #[test]
    fn commit_replaces_earlier_result() {
        let view = AggregateView::new();
        view.commit(success(MACHINES, Generation::INITIAL, json!({"n": 1})));
        view.commit(success(
            MACHINES,
            Generation::INITIAL.next(),
            json!({"n": 2}),
        ));

        assert_eq!(view.len(), 1);
        assert_eq!(view.payload(MACHINES).unwrap()["n"], 2);
    }

    #[test]
    fn failed_source_does_not_touch_siblings() {
        let view = AggregateView::new();
        view.commit(success(MACHINES, Generation::INITIAL, json!({"n": 3})));
        view.commit(SourceResult::failure(
            Generation::INITIAL,
            SHIFTS,
            SourceError::Backend("down".into()),
        ));

        assert!(view.is_fresh(MACHINES, Generation::INITIAL));
        assert!(!view.is_fresh(SHIFTS, Generation::INITIAL));
        assert_eq!(view.errors().len(), 1);
        assert_eq!(view.errors()[0].0, SHIFTS);
        assert_eq!(view.payload(MACHINES).unwrap()["n"], 3);
    }

    #[test]
    fn freshness_requires_matching_generation() {
        let view = AggregateView::new();
        view.commit(success(MACHINES, Generation::INITIAL, json!({})));

        assert!(view.is_fresh(MACHINES, Generation::INITIAL));
        assert!(!view.is_fresh(MACHINES, Generation::INITIAL.next()));
    }

    #[test]
    fn summaries_cover_only_sources_that_declared_one() {
        let view = AggregateView::new();
        view.commit(SourceResult::success(
            Generation::INITIAL,
            MACHINES,
            json!({}),
            Some(SourceSummary::new().metric("machines", 4.0)),
            EchoedParams::none(),
        ));
        view.commit(success(SHIFTS, Generation::INITIAL, json!({})));

        let summaries = view.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[&MACHINES].get("machines"), Some(4.0));
    }

    #[test]
    fn clear_empties_the_view() {
        let view = AggregateView::new();
        view.commit(success(MACHINES, Generation::INITIAL, json!({})));
        view.clear();
        assert!(view.is_empty());
    }
}
