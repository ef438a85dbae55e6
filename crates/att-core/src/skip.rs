//! Records skipped for data integrity reasons.
//!
//! Integrity violations never abort a run. Each offending record is skipped,
//! collected here, and reported in the run summary.

use std::fmt;

use serde::Serialize;

/// Why a record was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// An event ID seen again with a different card or timestamp.
    ConflictingDuplicate,
    /// An event older than the run's window.
    OutsideWindow,
    /// An event for a card missing from the observed roster.
    UnknownCard,
    /// An interval whose entry event was not accepted in this run.
    UnresolvedEntry,
    /// An interval whose exit event was not accepted in this run.
    UnresolvedExit,
    /// An interval whose exit does not come strictly after its entry.
    NonMonotonic,
    /// A second interval anchored on an already emitted entry event.
    DuplicateInterval,
    /// A card listed more than once in the observed roster.
    DuplicateEmployee,
    /// A stored open interval abandoned by a resumed run; it stays open.
    SupersededOpen,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ConflictingDuplicate => "conflicting-duplicate",
            Self::OutsideWindow => "outside-window",
            Self::UnknownCard => "unknown-card",
            Self::UnresolvedEntry => "unresolved-entry",
            Self::UnresolvedExit => "unresolved-exit",
            Self::NonMonotonic => "non-monotonic",
            Self::DuplicateInterval => "duplicate-interval",
            Self::DuplicateEmployee => "duplicate-employee",
            Self::SupersededOpen => "superseded-open",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single skipped record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub reason: SkipReason,
    /// Identifier of the offending record (event ID, entry event ID, or card).
    pub record: String,
}

impl SkippedRecord {
    pub fn new(reason: SkipReason, record: impl ToString) -> Self {
        Self {
            reason,
            record: record.to_string(),
        }
    }
}
