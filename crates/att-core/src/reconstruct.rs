//! Parallel per-card reconstruction.
//!
//! Cards share no mutable state, so each card's stream is matched on a
//! bounded `rayon` pool. Jobs are built from a `BTreeMap` keyed by card and
//! collected in order, keeping output reproducible.
//!
//! When a card has an interval the store still holds open, matching resumes
//! from it: the card starts inside, and only scans after its entry are
//! replayed. Earlier scans were reconciled by the run that opened it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use rayon::prelude::*;

use crate::event::ScanEvent;
use crate::interval::{EmployeeState, Interval};
use crate::matcher::{MatchOutcome, MatchStrategy, dedupe_events, match_employee};
use crate::roster::Employee;
use crate::skip::{SkipReason, SkippedRecord};
use crate::types::{Card, EventId, Window};

/// Inputs shared by every card in one reconstruction pass.
pub struct ReconstructParams<'a> {
    pub window: &'a Window,
    /// Cards present in the observed roster.
    pub roster: &'a [Employee],
    /// Latest interval the store still holds open, by card. Empty unless resuming.
    pub open: &'a HashMap<Card, Interval>,
    pub strategy: &'a dyn MatchStrategy,
    /// Worker threads; `0` lets rayon decide.
    pub concurrency: usize,
}

/// Output of one reconstruction pass.
#[derive(Debug, Default)]
pub struct Reconstruction {
    /// Distinct in-window events, sorted by ID. All of them are stored,
    /// including those of unknown cards.
    pub accepted: Vec<ScanEvent>,
    /// One outcome per reconstructed card, sorted by card.
    pub outcomes: Vec<MatchOutcome>,
    /// Entry IDs of store-open intervals used as starting points.
    pub resumed: HashSet<EventId>,
    pub skipped: Vec<SkippedRecord>,
}

/// Windows, deduplicates, groups and matches a raw event feed.
///
/// The window applies first, so a conflicting version outside it never
/// displaces the version inside it.
pub fn reconstruct(
    raw: Vec<ScanEvent>,
    params: &ReconstructParams<'_>,
) -> Result<Reconstruction, rayon::ThreadPoolBuildError> {
    let mut outside = BTreeSet::new();
    let mut in_window = Vec::with_capacity(raw.len());
    for event in raw {
        if params.window.contains(event.timestamp) {
            in_window.push(event);
        } else {
            outside.insert(event.id);
        }
    }
    let mut skipped: Vec<SkippedRecord> = outside
        .into_iter()
        .map(|id| SkippedRecord::new(SkipReason::OutsideWindow, id))
        .collect();

    let (accepted, conflicts) = dedupe_events(in_window);
    skipped.extend(conflicts);

    let known_cards: HashSet<&Card> = params.roster.iter().map(|e| &e.card).collect();
    let mut by_card: BTreeMap<Card, Vec<ScanEvent>> = BTreeMap::new();
    for event in &accepted {
        if known_cards.contains(&event.card) {
            by_card
                .entry(event.card.clone())
                .or_default()
                .push(event.clone());
        } else {
            skipped.push(SkippedRecord::new(SkipReason::UnknownCard, event.id));
        }
    }

    let mut resumed = HashSet::new();
    let jobs: Vec<(EmployeeState, Vec<ScanEvent>)> = by_card
        .into_iter()
        .map(|(card, mut events)| match params.open.get(&card) {
            Some(open) => {
                let from = (open.entry.timestamp, open.entry.id);
                let before = events.len();
                events.retain(|event| event.sort_key() > from);
                tracing::debug!(
                    %card,
                    entry_event_id = %open.entry.id,
                    reconciled = before - events.len(),
                    "resuming open interval"
                );
                resumed.insert(open.entry.id);
                (EmployeeState::resume(open.clone()), events)
            }
            None => (EmployeeState::outside(card), events),
        })
        .collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.concurrency)
        .thread_name(|index| format!("att-match-{index}"))
        .build()?;
    let strategy = params.strategy;
    let outcomes: Vec<MatchOutcome> = pool.install(|| {
        jobs.into_par_iter()
            .map(|(seed, events)| match_employee(seed, events, strategy))
            .collect()
    });

    tracing::debug!(
        accepted = accepted.len(),
        cards = outcomes.len(),
        resumed = resumed.len(),
        "reconstruction finished"
    );
    Ok(Reconstruction {
        accepted,
        outcomes,
        resumed,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::Alternating;
    use crate::matcher::fixtures::{card, scan, time};

    fn roster(cards: &[&str]) -> Vec<Employee> {
        cards
            .iter()
            .map(|c| Employee {
                card: card(c),
                first_name: "F".to_string(),
                last_name: "L".to_string(),
            })
            .collect()
    }

    fn window() -> Window {
        Window::trailing(1, time(20, 0, 0)).unwrap()
    }

    #[test]
    fn test_outcomes_are_sorted_by_card_regardless_of_pool_size() {
        let events = vec![
            scan(3, "C3", time(0, 9, 0)),
            scan(1, "C1", time(0, 9, 0)),
            scan(2, "C2", time(0, 9, 0)),
            scan(4, "C1", time(0, 17, 0)),
        ];
        let window = window();
        let roster = roster(&["C1", "C2", "C3"]);
        let open = HashMap::new();

        let single = reconstruct(
            events.clone(),
            &ReconstructParams {
                window: &window,
                roster: &roster,
                open: &open,
                strategy: &Alternating,
                concurrency: 1,
            },
        )
        .unwrap();
        let wide = reconstruct(
            events,
            &ReconstructParams {
                window: &window,
                roster: &roster,
                open: &open,
                strategy: &Alternating,
                concurrency: 4,
            },
        )
        .unwrap();

        let cards: Vec<&str> = single.outcomes.iter().map(|o| o.card.as_str()).collect();
        assert_eq!(cards, vec!["C1", "C2", "C3"]);
        assert_eq!(single.outcomes, wide.outcomes);
        assert_eq!(single.outcomes[0].intervals.len(), 1);
    }

    #[test]
    fn test_unknown_cards_and_old_events_are_skipped() {
        let window = window();
        let roster = roster(&["C1"]);
        let open = HashMap::new();
        let result = reconstruct(
            vec![
                scan(1, "C1", time(0, 9, 0)),
                scan(2, "ZZ", time(0, 9, 0)),
                scan(3, "C1", window.start - chrono::Duration::days(1)),
            ],
            &ReconstructParams {
                window: &window,
                roster: &roster,
                open: &open,
                strategy: &Alternating,
                concurrency: 2,
            },
        )
        .unwrap();

        let accepted: Vec<i64> = result.accepted.iter().map(|e| e.id.get()).collect();
        assert_eq!(accepted, vec![1, 2]);
        assert_eq!(result.outcomes.len(), 1);
        assert_eq!(
            result.skipped,
            vec![
                SkippedRecord::new(SkipReason::OutsideWindow, 3),
                SkippedRecord::new(SkipReason::UnknownCard, 2),
            ]
        );
    }

    #[test]
    fn test_store_open_interval_seeds_card() {
        let window = window();
        let roster = roster(&["C1", "C2"]);
        let before_window = window.start - chrono::Duration::hours(2);
        let mut open = HashMap::new();
        open.insert(
            card("C1"),
            Interval::open(card("C1"), scan(100, "C1", before_window).anchor()),
        );
        open.insert(
            card("C2"),
            Interval::open(card("C2"), scan(5, "C2", time(0, 9, 0)).anchor()),
        );

        let result = reconstruct(
            vec![scan(101, "C1", time(0, 6, 0)), scan(5, "C2", time(0, 9, 0))],
            &ReconstructParams {
                window: &window,
                roster: &roster,
                open: &open,
                strategy: &Alternating,
                concurrency: 0,
            },
        )
        .unwrap();

        assert_eq!(
            result.resumed,
            HashSet::from([EventId::new(100).unwrap(), EventId::new(5).unwrap()])
        );
        let c1 = &result.outcomes[0].intervals[0];
        assert_eq!(c1.entry.id.get(), 100);
        assert_eq!(c1.exit.unwrap().id.get(), 101);
        let c2 = &result.outcomes[1];
        assert!(c2.decisions.is_empty());
        assert_eq!(c2.intervals.len(), 1);
        assert!(c2.intervals[0].is_open());
    }

    #[test]
    fn test_resume_replays_only_scans_after_open_entry() {
        let window = window();
        let roster = roster(&["C1"]);
        let mut open = HashMap::new();
        open.insert(
            card("C1"),
            Interval::open(card("C1"), scan(3, "C1", time(1, 8, 0)).anchor()),
        );

        // The window slid past scan 1; scans 2 and 3 were reconciled earlier.
        let result = reconstruct(
            vec![
                scan(2, "C1", time(0, 17, 0)),
                scan(3, "C1", time(1, 8, 0)),
                scan(4, "C1", time(1, 17, 0)),
            ],
            &ReconstructParams {
                window: &window,
                roster: &roster,
                open: &open,
                strategy: &Alternating,
                concurrency: 1,
            },
        )
        .unwrap();

        assert_eq!(result.accepted.len(), 3);
        let outcome = &result.outcomes[0];
        assert_eq!(outcome.decisions.len(), 1);
        assert_eq!(outcome.decisions[0].event.id.get(), 4);
        assert_eq!(outcome.intervals.len(), 1);
        assert_eq!(outcome.intervals[0].entry.id.get(), 3);
        assert_eq!(outcome.intervals[0].exit.unwrap().id.get(), 4);
    }

    #[test]
    fn test_window_applies_before_conflict_resolution() {
        let window = window();
        let roster = roster(&["C1"]);
        let open = HashMap::new();
        let result = reconstruct(
            vec![
                scan(7, "C1", window.start - chrono::Duration::days(3)),
                scan(7, "C1", time(0, 9, 0)),
            ],
            &ReconstructParams {
                window: &window,
                roster: &roster,
                open: &open,
                strategy: &Alternating,
                concurrency: 1,
            },
        )
        .unwrap();

        assert_eq!(result.accepted, vec![scan(7, "C1", time(0, 9, 0))]);
        assert_eq!(
            result.skipped,
            vec![SkippedRecord::new(SkipReason::OutsideWindow, 7)]
        );
        assert_eq!(result.outcomes[0].intervals.len(), 1);
    }
}
