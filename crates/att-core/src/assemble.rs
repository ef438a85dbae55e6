//! Interval assembly.
//!
//! Flattens per-card match outcomes into storage-ready records tagged with the
//! run's provenance. Records that fail integrity checks are skipped and
//! reported; one bad card never blocks the others.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::interval::Interval;
use crate::matcher::MatchOutcome;
use crate::skip::{SkipReason, SkippedRecord};
use crate::types::{Card, EventId, format_timestamp};

/// An interval ready to be written to the store.
///
/// The exit is explicit: both `exit_at` and `exit_event_id` are `None` for an
/// open interval. Event IDs are never zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRecord {
    /// Entry timestamp, `%Y-%m-%dT%H:%M:%S`.
    pub entry_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_at: Option<String>,
    pub card: Card,
    /// Controller or division that produced the interval.
    pub provenance: String,
    pub entry_event_id: EventId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_event_id: Option<EventId>,
}

impl IntervalRecord {
    /// Builds the record for `interval`.
    #[must_use]
    pub fn from_interval(interval: &Interval, provenance: &str) -> Self {
        Self {
            entry_at: format_timestamp(interval.entry.timestamp),
            exit_at: interval.exit.map(|exit| format_timestamp(exit.timestamp)),
            card: interval.card.clone(),
            provenance: provenance.to_string(),
            entry_event_id: interval.entry.id,
            exit_event_id: interval.exit.map(|exit| exit.id),
        }
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.exit_event_id.is_none()
    }
}

/// Result of assembling one run's intervals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembly {
    /// Records in card order, then entry order.
    pub records: Vec<IntervalRecord>,
    pub skipped: Vec<SkippedRecord>,
}

/// Assembles storage-ready records from per-card outcomes.
///
/// `known_events` holds every event ID the run accepted (plus entry IDs of
/// store-open intervals it resumed). An interval anchored on anything else is
/// skipped, as is one whose exit is not strictly after its entry or whose entry
/// was already emitted.
pub fn assemble(
    outcomes: &[MatchOutcome],
    provenance: &str,
    known_events: &HashSet<EventId>,
) -> Assembly {
    let mut assembly = Assembly::default();
    let mut emitted: HashSet<EventId> = HashSet::new();

    for interval in outcomes.iter().flat_map(|outcome| &outcome.intervals) {
        let entry_id = interval.entry.id;
        let violation = if !known_events.contains(&entry_id) {
            Some(SkipReason::UnresolvedEntry)
        } else if interval
            .exit
            .is_some_and(|exit| !known_events.contains(&exit.id))
        {
            Some(SkipReason::UnresolvedExit)
        } else if interval
            .exit
            .is_some_and(|exit| exit.timestamp <= interval.entry.timestamp)
        {
            Some(SkipReason::NonMonotonic)
        } else if !emitted.insert(entry_id) {
            Some(SkipReason::DuplicateInterval)
        } else {
            None
        };

        match violation {
            Some(reason) => {
                tracing::warn!(card = %interval.card, entry_event_id = %entry_id, %reason, "skipping interval");
                assembly
                    .skipped
                    .push(SkippedRecord::new(reason, entry_id));
            }
            None => assembly
                .records
                .push(IntervalRecord::from_interval(interval, provenance)),
        }
    }

    tracing::info!(
        formed = assembly.records.len(),
        skipped = assembly.skipped.len(),
        "intervals formed"
    );
    assembly
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::EmployeeState;
    use crate::matcher::fixtures::{card, scan, time};
    use crate::matcher::{Alternating, match_employee};

    fn outcome(card_id: &str, events: Vec<crate::event::ScanEvent>) -> MatchOutcome {
        match_employee(EmployeeState::outside(card(card_id)), events, &Alternating)
    }

    fn known(ids: &[i64]) -> HashSet<EventId> {
        ids.iter().map(|id| EventId::new(*id).unwrap()).collect()
    }

    #[test]
    fn test_records_carry_explicit_exit_and_provenance() {
        let outcomes = [outcome(
            "C1",
            vec![
                scan(1, "C1", time(0, 8, 58)),
                scan(2, "C1", time(0, 17, 3)),
                scan(3, "C1", time(1, 9, 2)),
            ],
        )];

        let assembly = assemble(&outcomes, "north-gate", &known(&[1, 2, 3]));
        assert!(assembly.skipped.is_empty());
        assert_eq!(
            assembly.records,
            vec![
                IntervalRecord {
                    entry_at: "2025-01-06T08:58:00".to_string(),
                    exit_at: Some("2025-01-06T17:03:00".to_string()),
                    card: card("C1"),
                    provenance: "north-gate".to_string(),
                    entry_event_id: EventId::new(1).unwrap(),
                    exit_event_id: Some(EventId::new(2).unwrap()),
                },
                IntervalRecord {
                    entry_at: "2025-01-07T09:02:00".to_string(),
                    exit_at: None,
                    card: card("C1"),
                    provenance: "north-gate".to_string(),
                    entry_event_id: EventId::new(3).unwrap(),
                    exit_event_id: None,
                },
            ]
        );
        assert!(assembly.records[1].is_open());
    }

    #[test]
    fn test_unresolved_entry_skips_only_that_record() {
        let outcomes = [
            outcome("C1", vec![scan(1, "C1", time(0, 9, 0))]),
            outcome("C2", vec![scan(2, "C2", time(0, 9, 0))]),
        ];

        let assembly = assemble(&outcomes, "main", &known(&[2]));
        assert_eq!(assembly.records.len(), 1);
        assert_eq!(assembly.records[0].card, card("C2"));
        assert_eq!(
            assembly.skipped,
            vec![SkippedRecord::new(SkipReason::UnresolvedEntry, 1)]
        );
    }

    #[test]
    fn test_same_second_pair_is_non_monotonic() {
        let outcomes = [outcome(
            "C1",
            vec![scan(1, "C1", time(0, 9, 0)), scan(2, "C1", time(0, 9, 0))],
        )];

        let assembly = assemble(&outcomes, "main", &known(&[1, 2]));
        assert!(assembly.records.is_empty());
        assert_eq!(assembly.skipped[0].reason, SkipReason::NonMonotonic);
    }

    #[test]
    fn test_repeated_entry_is_emitted_once() {
        let single = outcome("C1", vec![scan(1, "C1", time(0, 9, 0))]);
        let assembly = assemble(&[single.clone(), single], "main", &known(&[1]));
        assert_eq!(assembly.records.len(), 1);
        assert_eq!(assembly.skipped[0].reason, SkipReason::DuplicateInterval);
    }
}
