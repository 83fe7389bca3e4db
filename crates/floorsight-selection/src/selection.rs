//! The active filter tuple
//!
//! A [`Selection`] is an immutable snapshot of the dashboard filters: lab,
//! optional machine, optional shift, and the date window. It is replaced
//! wholesale through a [`SelectionPatch`]; dependent fields (machine, shift)
//! never survive a lab switch unless the same patch supplies replacements.

use crate::range::DateRange;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a backend identifier
            #[inline]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a lab (shopfloor)
    LabId
);
string_id!(
    /// Identifier of a machine within a lab
    MachineId
);
string_id!(
    /// Name of a configured shift
    ShiftName
);

/// Machine scope of a query: one machine, or every machine in the lab
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineScope {
    /// Every machine in the selected lab
    All,
    /// A single machine
    One(MachineId),
}

impl Display for MachineScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::One(id) => f.write_str(id.as_str()),
        }
    }
}

/// The active filter tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Selected lab
    pub lab_id: LabId,
    /// Selected machine; `None` means all machines in the lab
    pub machine_id: Option<MachineId>,
    /// Selected shift; `None` means no shift filter
    pub shift: Option<ShiftName>,
    /// Date window
    pub range: DateRange,
}

impl Selection {
    /// Create a selection scoped to a lab and window, with no machine or
    /// shift filter
    #[inline]
    #[must_use]
    pub fn new(lab_id: LabId, range: DateRange) -> Self {
        Self {
            lab_id,
            machine_id: None,
            shift: None,
            range,
        }
    }

    /// With a specific machine selected
    #[inline]
    #[must_use]
    pub fn with_machine(mut self, machine_id: MachineId) -> Self {
        self.machine_id = Some(machine_id);
        self
    }

    /// With a shift filter
    #[inline]
    #[must_use]
    pub fn with_shift(mut self, shift: ShiftName) -> Self {
        self.shift = Some(shift);
        self
    }

    /// The machine scope implied by the tuple
    #[inline]
    #[must_use]
    pub fn machine_scope(&self) -> MachineScope {
        match &self.machine_id {
            Some(id) => MachineScope::One(id.clone()),
            None => MachineScope::All,
        }
    }

    /// Same filters over a different date window
    #[inline]
    #[must_use]
    pub fn over_range(&self, range: DateRange) -> Self {
        Self {
            range,
            ..self.clone()
        }
    }
}

/// A partial update to the selection tuple
///
/// Unset fields keep their current value. Setting `lab_id` to a *different*
/// lab clears `machine_id` and `shift` unless the same patch also sets them:
/// a machine or shift can only ever reference the lab it was listed under.
#[derive(Debug, Clone, Default)]
pub struct SelectionPatch {
    lab_id: Option<LabId>,
    machine_id: Option<Option<MachineId>>,
    shift: Option<Option<ShiftName>>,
    range: Option<DateRange>,
}

impl SelectionPatch {
    /// Empty patch (applies as a structural no-op)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lab
    #[inline]
    #[must_use]
    pub fn lab(mut self, lab_id: LabId) -> Self {
        self.lab_id = Some(lab_id);
        self
    }

    /// Set or clear the machine filter
    #[inline]
    #[must_use]
    pub fn machine(mut self, machine_id: Option<MachineId>) -> Self {
        self.machine_id = Some(machine_id);
        self
    }

    /// Set or clear the shift filter
    #[inline]
    #[must_use]
    pub fn shift(mut self, shift: Option<ShiftName>) -> Self {
        self.shift = Some(shift);
        self
    }

    /// Set the date window
    #[inline]
    #[must_use]
    pub fn range(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Resolve the patch against the current tuple
    #[must_use]
    pub fn apply_to(&self, current: &Selection) -> Selection {
        let lab_changed = self
            .lab_id
            .as_ref()
            .is_some_and(|lab| *lab != current.lab_id);

        let machine_id = match (&self.machine_id, lab_changed) {
            (Some(explicit), _) => explicit.clone(),
            // Dependent fields reset on a lab switch
            (None, true) => None,
            (None, false) => current.machine_id.clone(),
        };
        let shift = match (&self.shift, lab_changed) {
            (Some(explicit), _) => explicit.clone(),
            (None, true) => None,
            (None, false) => current.shift.clone(),
        };

        Selection {
            lab_id: self.lab_id.clone().unwrap_or_else(|| current.lab_id.clone()),
            machine_id,
            shift,
            range: self.range.unwrap_or(current.range),
        }
    }
}
