//! Core domain logic for attendance reconciliation.
//!
//! This crate contains the fundamental types and logic for:
//! - Matching: turning one card's raw scans into entry/exit decisions and intervals
//! - Assembly: flattening per-card intervals into storage-ready records
//! - Roster sync: diffing the observed roster against the stored one
//! - Running: wiring an [`EventSource`] and a [`Store`] into one idempotent run

mod assemble;
mod event;
pub mod gap_aware;
mod interval;
pub mod matcher;
pub mod reconstruct;
mod roster;
pub mod run;
mod skip;
mod source;
mod store;
pub mod types;

pub use assemble::{Assembly, IntervalRecord, assemble};
pub use event::{EventRef, ScanEvent};
pub use gap_aware::GapAware;
pub use interval::{EmployeeState, Interval, Occupancy};
pub use matcher::{
    Alternating, MatchOutcome, MatchStrategy, ScanDecision, ScanRole, dedupe_events, match_employee,
};
pub use roster::{Employee, RosterDiff, diff_roster};
pub use run::{RunError, RunOptions, RunSummary, Stage, run};
pub use skip::{SkipReason, SkippedRecord};
pub use source::EventSource;
pub use store::{EmployeeWrites, Store};
pub use types::{Card, EventId, ValidationError, Window};
