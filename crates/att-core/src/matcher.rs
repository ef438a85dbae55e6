//! Employee event matcher.
//!
//! Turns one card's unordered scan events into an ordered sequence of
//! entry/exit decisions and the intervals they form.
//!
//! # Algorithm
//!
//! 1. Drop repeated event IDs (identity, not timestamp: two genuine scans can
//!    share a second)
//! 2. Sort by timestamp, ties broken by event ID
//! 3. Hand the sorted stream to a [`MatchStrategy`], starting from the card's
//!    [`EmployeeState`] (outside, unless resuming an open interval)
//!
//! A stream that ends inside leaves exactly one trailing open interval. That is
//! how a missing exit scan is represented; it is not an error.

use std::collections::HashSet;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::event::ScanEvent;
use crate::interval::{EmployeeState, Interval, Occupancy};
use crate::skip::{SkipReason, SkippedRecord};
use crate::types::Card;

/// How a single scan was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanRole {
    Entry,
    Exit,
    /// Duplicate or orphaned scan that does not bound any interval.
    Noise,
}

/// The decision taken for one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanDecision {
    pub event: ScanEvent,
    pub role: ScanRole,
    /// Time since the previous scan of the same card, `None` for the first.
    pub gap: Option<Duration>,
}

/// Everything the matcher produced for one card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub card: Card,
    /// One decision per distinct scan, in time order.
    pub decisions: Vec<ScanDecision>,
    /// Intervals in entry order; only the last may be open.
    pub intervals: Vec<Interval>,
    /// A resumed interval the strategy gave up on without an exit. It stays
    /// open in the store.
    pub superseded: Option<Interval>,
}

impl MatchOutcome {
    /// Returns the trailing open interval, if the stream ended inside.
    #[must_use]
    pub fn open_interval(&self) -> Option<&Interval> {
        self.intervals.last().filter(|interval| interval.is_open())
    }

    /// Number of scans classified as noise.
    #[must_use]
    pub fn discarded(&self) -> usize {
        self.decisions
            .iter()
            .filter(|decision| decision.role == ScanRole::Noise)
            .count()
    }
}

/// A pluggable entry/exit classification rule.
///
/// Implementations receive events already deduplicated and sorted, so the
/// deterministic and gap-aware strategies can be compared on the same fixtures.
pub trait MatchStrategy: Send + Sync {
    /// Classifies `sorted` starting from `seed`.
    fn classify(&self, seed: &EmployeeState, sorted: &[ScanEvent]) -> MatchOutcome;
}

/// Strict two-state alternation: outside → entry, inside → exit.
///
/// Every scan flips the state. Gap durations are recorded on the decisions
/// but never influence them.
#[derive(Debug, Clone, Copy, Default)]
pub struct Alternating;

impl MatchStrategy for Alternating {
    fn classify(&self, seed: &EmployeeState, sorted: &[ScanEvent]) -> MatchOutcome {
        let mut state = seed.clone();
        let mut decisions = Vec::with_capacity(sorted.len());
        let mut intervals = Vec::new();

        for (event, gap) in sorted.iter().zip(scan_gaps(seed, sorted)) {
            let role = match state.occupancy {
                Occupancy::Outside => {
                    state.enter(event.anchor());
                    ScanRole::Entry
                }
                Occupancy::Inside => {
                    intervals.extend(state.leave(event.anchor()));
                    ScanRole::Exit
                }
            };
            decisions.push(ScanDecision {
                event: event.clone(),
                role,
                gap,
            });
        }
        intervals.extend(state.into_open());

        MatchOutcome {
            card: seed.card.clone(),
            decisions,
            intervals,
            superseded: None,
        }
    }
}

/// Matches one card's events.
///
/// Events belonging to other cards are ignored.
pub fn match_employee(
    seed: EmployeeState,
    mut events: Vec<ScanEvent>,
    strategy: &dyn MatchStrategy,
) -> MatchOutcome {
    events.retain(|event| event.card == seed.card);
    events.sort_unstable_by_key(ScanEvent::sort_key);
    // Conflicting versions were already rejected run-wide; this only drops
    // exact resubmissions, keeping the earliest version of an ID.
    let mut seen = HashSet::with_capacity(events.len());
    events.retain(|event| seen.insert(event.id));

    let outcome = strategy.classify(&seed, &events);
    tracing::trace!(
        card = %outcome.card,
        scans = outcome.decisions.len(),
        intervals = outcome.intervals.len(),
        "matched card"
    );
    outcome
}

/// Removes repeated event IDs from a raw feed.
///
/// Exact resubmissions collapse silently. When one ID arrives with different
/// cards or timestamps, the earliest version (by timestamp, then card) is kept
/// and every other version is reported as [`SkipReason::ConflictingDuplicate`].
/// The result is independent of input order and sorted by event ID.
pub fn dedupe_events(mut raw: Vec<ScanEvent>) -> (Vec<ScanEvent>, Vec<SkippedRecord>) {
    raw.sort_unstable_by(|a, b| {
        a.id.cmp(&b.id)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
            .then_with(|| a.card.cmp(&b.card))
    });

    let mut accepted: Vec<ScanEvent> = Vec::with_capacity(raw.len());
    let mut skipped = Vec::new();
    for event in raw {
        match accepted.last() {
            Some(kept) if kept.id == event.id => {
                if *kept != event {
                    tracing::warn!(
                        event_id = %event.id,
                        card = %event.card,
                        timestamp = %event.timestamp,
                        "conflicting duplicate event"
                    );
                    skipped.push(SkippedRecord::new(SkipReason::ConflictingDuplicate, event.id));
                }
            }
            _ => accepted.push(event),
        }
    }
    (accepted, skipped)
}

/// Gap before each scan: from the previous scan, or from the seed's last event.
pub(crate) fn scan_gaps(seed: &EmployeeState, sorted: &[ScanEvent]) -> Vec<Option<Duration>> {
    let mut previous: Option<NaiveDateTime> = seed.last_event.map(|event| event.timestamp);
    sorted
        .iter()
        .map(|event| {
            let gap = previous.map(|prev| event.timestamp - prev);
            previous = Some(event.timestamp);
            gap
        })
        .collect()
}
