//! Echoed-parameter validation
//!
//! The staleness gate catches generation-level races, but a subtler class
//! remains: a source can respond with correct-generation data that still
//! reflects a different selection than currently displayed (a slow request
//! echoing a shift that was valid when issued). Before any derived
//! computation is permitted, every committed result's echoed parameters are
//! re-checked against the *live* selection; disagreements are collected
//! into a list, never short-circuited into a single error.

use floorsight_selection::Selection;
use floorsight_sources::{AggregateView, SourceId, SourceResult};
use std::fmt::{self, Display, Formatter};

/// The selection field a source disagreed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Lab identifier
    Lab,
    /// Machine scope
    Machine,
    /// Shift name
    Shift,
    /// Window start
    RangeStart,
    /// Window end
    RangeEnd,
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lab => "lab",
            Self::Machine => "machine",
            Self::Shift => "shift",
            Self::RangeStart => "range start",
            Self::RangeEnd => "range end",
        };
        f.write_str(name)
    }
}

/// One disagreement between a committed result and the live selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Source whose echo disagrees
    pub source_id: SourceId,
    /// The disagreeing field
    pub field: Field,
    /// Value in the live selection
    pub expected: String,
    /// Value the source echoed
    pub echoed: String,
}

impl Display for Mismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} is {:?}, selection has {:?}",
            self.source_id, self.field, self.echoed, self.expected
        )
    }
}

/// Check every committed result against the live selection
///
/// Only fields a source actually echoed are compared; an empty echo is
/// vacuously consistent. Returns every disagreement; an empty vec means the
/// view is consistent.
#[must_use]
pub fn validate(view: &AggregateView, selection: &Selection) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    for result in view.results() {
        if result.is_success() {
            check_result(&result, selection, &mut mismatches);
        }
    }
    if !mismatches.is_empty() {
        tracing::warn!(
            count = mismatches.len(),
            "committed data disagrees with the active selection"
        );
    }
    mismatches
}

fn check_result(result: &SourceResult, selection: &Selection, out: &mut Vec<Mismatch>) {
    let echoed = &result.echoed;
    let id = result.source_id;

    if let Some(lab) = &echoed.lab_id {
        if *lab != selection.lab_id {
            out.push(Mismatch {
                source_id: id,
                field: Field::Lab,
                expected: selection.lab_id.to_string(),
                echoed: lab.to_string(),
            });
        }
    }
    if let Some(machine) = &echoed.machine {
        let expected = selection.machine_scope();
        if *machine != expected {
            out.push(Mismatch {
                source_id: id,
                field: Field::Machine,
                expected: expected.to_string(),
                echoed: machine.to_string(),
            });
        }
    }
    if let Some(shift) = &echoed.shift {
        if Some(shift) != selection.shift.as_ref() {
            out.push(Mismatch {
                source_id: id,
                field: Field::Shift,
                expected: selection
                    .shift
                    .as_ref()
                    .map_or_else(String::new, ToString::to_string),
                echoed: shift.to_string(),
            });
        }
    }
    if let Some(start) = echoed.start {
        if start != selection.range.start() {
            out.push(Mismatch {
                source_id: id,
                field: Field::RangeStart,
                expected: selection.range.start().to_string(),
                echoed: start.to_string(),
            });
        }
    }
    if let Some(end) = echoed.end {
        if end != selection.range.end() {
            out.push(Mismatch {
                source_id: id,
                field: Field::RangeEnd,
                expected: selection.range.end().to_string(),
                echoed: end.to_string(),
            });
        }
    }
}
