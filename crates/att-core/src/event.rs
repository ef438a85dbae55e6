//! Raw card scan events from the access-control device.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::{Card, EventId};

/// A single card scan observed by a reader.
///
/// Events are immutable once observed. The same event may be resubmitted
/// across runs; identity is the source-assigned `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanEvent {
    /// Unique, source-assigned identifier.
    pub id: EventId,
    /// The card that was scanned.
    pub card: Card,
    /// When the scan occurred, on the device's local clock.
    pub timestamp: NaiveDateTime,
}

impl ScanEvent {
    /// Returns the reference used to anchor an interval boundary.
    #[must_use]
    pub const fn anchor(&self) -> EventRef {
        EventRef {
            id: self.id,
            timestamp: self.timestamp,
        }
    }

    /// Ordering key used by reconstruction: timestamp, then ID.
    #[must_use]
    pub const fn sort_key(&self) -> (NaiveDateTime, EventId) {
        (self.timestamp, self.id)
    }
}

/// A reference to the event anchoring an interval boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventRef {
    pub id: EventId,
    pub timestamp: NaiveDateTime,
}
