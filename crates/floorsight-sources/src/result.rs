//! Source identifiers, echoed parameters, and settled results

use crate::error::SourceError;
use chrono::NaiveDate;
use floorsight_selection::{Generation, LabId, MachineScope, Selection, ShiftName};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Identifier of a declared data source
///
/// Sources are declared in code, so ids are static strings; the type is
/// `Copy` and ordered so it can key maps and graph nodes directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SourceId(&'static str);

impl SourceId {
    /// Wrap a static source name
    #[inline]
    #[must_use]
    pub const fn new(id: &'static str) -> Self {
        Self(id)
    }

    /// Borrow the raw name
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// The selection parameters a source reports it actually used
///
/// Backends echo back any subset of the scoping parameters; unset fields
/// simply go unchecked. The consistency validator compares the echoed
/// values against the live selection before a derived computation is
/// allowed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EchoedParams {
    /// Lab the backend scoped to
    pub lab_id: Option<LabId>,
    /// Machine scope the backend queried
    pub machine: Option<MachineScope>,
    /// Shift the backend filtered by
    pub shift: Option<ShiftName>,
    /// Window start the backend used
    pub start: Option<NaiveDate>,
    /// Window end the backend used
    pub end: Option<NaiveDate>,
}

impl EchoedParams {
    /// No parameters reported
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Echo every field of a selection (helper for well-behaved backends)
    #[must_use]
    pub fn from_selection(selection: &Selection) -> Self {
        Self {
            lab_id: Some(selection.lab_id.clone()),
            machine: Some(selection.machine_scope()),
            shift: selection.shift.clone(),
            start: Some(selection.range.start()),
            end: Some(selection.range.end()),
        }
    }

    /// With the lab echoed
    #[inline]
    #[must_use]
    pub fn with_lab(mut self, lab_id: LabId) -> Self {
        self.lab_id = Some(lab_id);
        self
    }

    /// With the machine scope echoed
    #[inline]
    #[must_use]
    pub fn with_machine(mut self, machine: MachineScope) -> Self {
        self.machine = Some(machine);
        self
    }

    /// With the shift echoed
    #[inline]
    #[must_use]
    pub fn with_shift(mut self, shift: ShiftName) -> Self {
        self.shift = Some(shift);
        self
    }

    /// With both window bounds echoed
    #[inline]
    #[must_use]
    pub fn with_window(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Whether nothing was reported
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lab_id.is_none()
            && self.machine.is_none()
            && self.shift.is_none()
            && self.start.is_none()
            && self.end.is_none()
    }
}

/// Small numeric summary of a payload
///
/// Fingerprints are computed over these instead of full payloads; large
/// per-record arrays stay out so comparisons remain stable and cheap.
/// Backed by a `BTreeMap` so iteration order is canonical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary(BTreeMap<String, f64>);

impl SourceSummary {
    /// Empty summary
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named metric (builder style)
    #[inline]
    #[must_use]
    pub fn metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    /// Look up a metric
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Iterate metrics in canonical (name) order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Whether the summary carries no metrics
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A settled fetch for one source
///
/// The generation is captured when the request is issued, never at response
/// time; the staleness gate compares it against the store's current
/// generation before the result may touch view state.
#[derive(Debug, Clone)]
pub struct SourceResult {
    /// Generation captured at issue time
    pub generation: Generation,
    /// The source this result belongs to
    pub source_id: SourceId,
    /// Payload on success
    pub payload: Option<Value>,
    /// Numeric summary extracted from the payload on success
    pub summary: Option<SourceSummary>,
    /// Failure, isolated to this source
    pub error: Option<SourceError>,
    /// Parameters the backend reported using
    pub echoed: EchoedParams,
}

impl SourceResult {
    /// A successful settle
    #[must_use]
    pub fn success(
        generation: Generation,
        source_id: SourceId,
        payload: Value,
        summary: Option<SourceSummary>,
        echoed: EchoedParams,
    ) -> Self {
        Self {
            generation,
            source_id,
            payload: Some(payload),
            summary,
            error: None,
            echoed,
        }
    }

    /// A failed settle
    #[must_use]
    pub fn failure(generation: Generation, source_id: SourceId, error: SourceError) -> Self {
        Self {
            generation,
            source_id,
            payload: None,
            summary: None,
            error: Some(error),
            echoed: EchoedParams::none(),
        }
    }

    /// Whether the source settled with a payload
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.payload.is_some()
    }
}
