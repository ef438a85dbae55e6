//! Work intervals and the per-card working state that produces them.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::event::EventRef;
use crate::types::Card;

/// One work session: a confirmed entry and an optional exit.
///
/// `entry.timestamp < exit.timestamp` whenever the exit is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub card: Card,
    pub entry: EventRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<EventRef>,
}

impl Interval {
    /// Opens a new interval anchored on `entry`.
    #[must_use]
    pub const fn open(card: Card, entry: EventRef) -> Self {
        Self {
            card,
            entry,
            exit: None,
        }
    }

    /// Returns whether the exit has not been observed yet.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.exit.is_none()
    }

    /// Time between entry and exit, if closed.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.exit.map(|exit| exit.timestamp - self.entry.timestamp)
    }
}

/// Inferred presence of an employee on site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Occupancy {
    Outside,
    Inside,
}

/// Working state for one card during a single reconstruction run.
///
/// Never persisted; each run re-derives it, either from scratch
/// ([`EmployeeState::outside`]) or from an interval the store still holds open
/// ([`EmployeeState::resume`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeState {
    pub card: Card,
    pub occupancy: Occupancy,
    /// The last event a decision was made for.
    pub last_event: Option<EventRef>,
    /// The in-progress interval, present exactly when `occupancy` is `Inside`.
    pub open: Option<Interval>,
}

impl EmployeeState {
    /// Starts a card with no prior knowledge: assumed outside.
    #[must_use]
    pub const fn outside(card: Card) -> Self {
        Self {
            card,
            occupancy: Occupancy::Outside,
            last_event: None,
            open: None,
        }
    }

    /// Starts a card inside, continuing an interval left open by an earlier run.
    #[must_use]
    pub fn resume(open: Interval) -> Self {
        Self {
            card: open.card.clone(),
            occupancy: Occupancy::Inside,
            last_event: Some(open.entry),
            open: Some(open),
        }
    }

    /// Opens an interval at `entry`. The caller guarantees the state is outside.
    pub(crate) fn enter(&mut self, entry: EventRef) {
        debug_assert!(self.open.is_none(), "entering while an interval is open");
        self.open = Some(Interval::open(self.card.clone(), entry));
        self.occupancy = Occupancy::Inside;
        self.last_event = Some(entry);
    }

    /// Closes the open interval at `exit` and returns it.
    pub(crate) fn leave(&mut self, exit: EventRef) -> Option<Interval> {
        let mut interval = self.open.take()?;
        interval.exit = Some(exit);
        self.occupancy = Occupancy::Outside;
        self.last_event = Some(exit);
        Some(interval)
    }

    /// Abandons the open interval without an exit.
    pub(crate) fn abandon(&mut self) -> Option<Interval> {
        self.occupancy = Occupancy::Outside;
        self.open.take()
    }

    /// Consumes the state, yielding the trailing open interval, if any.
    pub(crate) fn into_open(self) -> Option<Interval> {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::types::EventId;

    fn anchor(id: i64, hour: u32) -> EventRef {
        EventRef {
            id: EventId::new(id).unwrap(),
            timestamp: NaiveDate::from_ymd_opt(2025, 1, 6)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_enter_then_leave_closes_interval() {
        let mut state = EmployeeState::outside(Card::new("C1").unwrap());
        state.enter(anchor(1, 9));
        assert_eq!(state.occupancy, Occupancy::Inside);

        let closed = state.leave(anchor(2, 17)).unwrap();
        assert_eq!(state.occupancy, Occupancy::Outside);
        assert_eq!(closed.duration(), Some(Duration::hours(8)));
        assert!(state.into_open().is_none());
    }

    #[test]
    fn test_resume_starts_inside_with_open_interval() {
        let open = Interval::open(Card::new("C1").unwrap(), anchor(1, 9));
        let state = EmployeeState::resume(open.clone());
        assert_eq!(state.occupancy, Occupancy::Inside);
        assert_eq!(state.last_event, Some(open.entry));
        assert_eq!(state.into_open(), Some(open));
    }

    #[test]
    fn test_leave_without_open_interval_is_none() {
        let mut state = EmployeeState::outside(Card::new("C1").unwrap());
        assert!(state.leave(anchor(2, 17)).is_none());
    }
}
