//! Store interface.
//!
//! Every write is an idempotent upsert, so repeated or overlapping runs never
//! create duplicate or contradictory records.

use crate::assemble::IntervalRecord;
use crate::event::ScanEvent;
use crate::roster::Employee;

/// Rows written by [`Store::upsert_employees`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmployeeWrites {
    pub inserted: usize,
    pub updated: usize,
}

/// Durable storage for employees, events and intervals.
///
/// Each method is one unit of work: it either commits fully or not at all.
pub trait Store {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the persisted roster.
    fn all_employees(&self) -> Result<Vec<Employee>, Self::Error>;

    /// Inserts unknown cards and updates changed names.
    fn upsert_employees(
        &mut self,
        insert: &[Employee],
        update: &[Employee],
    ) -> Result<EmployeeWrites, Self::Error>;

    /// Inserts events, ignoring IDs that already exist. Returns rows inserted.
    fn upsert_events(&mut self, events: &[ScanEvent]) -> Result<usize, Self::Error>;

    /// Inserts intervals, ignoring entry event IDs that already exist.
    /// Returns rows inserted.
    fn upsert_intervals(&mut self, intervals: &[IntervalRecord]) -> Result<usize, Self::Error>;

    /// Returns stored intervals without an exit.
    fn open_intervals(&self) -> Result<Vec<IntervalRecord>, Self::Error>;

    /// Fills the exit of stored intervals that are still open, matched on
    /// entry event ID. Closed intervals are never rewritten. Returns rows closed.
    fn close_open_intervals(&mut self, closed: &[IntervalRecord]) -> Result<usize, Self::Error>;
}
