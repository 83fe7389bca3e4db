//! Deterministic fingerprints over selection + result summaries
//!
//! A [`Fingerprint`] is a strongly-typed 32-byte Blake3 digest of the
//! normalized selection and the per-source numeric summaries. It decides
//! when the derived analysis must be invalidated: same filters and same
//! underlying numbers fingerprint identically, whatever the object identity
//! or map insertion order; large payload arrays are deliberately excluded
//! upstream so comparisons stay stable and cheap.

use floorsight_selection::Selection;
use floorsight_sources::{SourceId, SourceSummary};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::fmt::Write as _;

/// A 32-byte fingerprint digest (Blake3)
///
/// Compared, never persisted. Cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Wrap raw digest bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Digest arbitrary bytes
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Reference to the digest bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short representation for log lines (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Fingerprint the current view inputs
///
/// The canonical encoding covers:
/// - normalized selection fields: lab id, machine scope (`all` sentinel for
///   no machine), shift (empty sentinel for no shift), and both window
///   bounds as `YYYY-MM-DD`
/// - every source summary, iterated in source-id then metric-name order
#[must_use]
pub fn fingerprint(
    selection: &Selection,
    summaries: &BTreeMap<SourceId, SourceSummary>,
) -> Fingerprint {
    let mut encoded = String::new();
    let _ = write!(
        encoded,
        "lab={};machine={};shift={};start={};end={}",
        selection.lab_id,
        selection.machine_scope(),
        selection
            .shift
            .as_ref()
            .map_or("", |shift| shift.as_str()),
        selection.range.start(),
        selection.range.end(),
    );
    for (source_id, summary) in summaries {
        for (metric, value) in summary.iter() {
            let _ = write!(encoded, ";{source_id}.{metric}={value}");
        }
    }
    Fingerprint::compute(encoded.as_bytes())
}
