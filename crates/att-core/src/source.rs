//! Event source interface.
//!
//! Extraction from the access-control device lives outside this crate; a run
//! only needs the roster and the scans for its window.

use crate::event::ScanEvent;
use crate::roster::Employee;
use crate::types::Window;

/// Supplies the roster and raw scans for one run.
pub trait EventSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists every employee known to the device.
    fn list_employees(&self) -> Result<Vec<Employee>, Self::Error>;

    /// Lists scans at or after `window.start`. Order is not significant.
    fn list_events(&self, window: &Window) -> Result<Vec<ScanEvent>, Self::Error>;
}
