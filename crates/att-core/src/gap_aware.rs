//! Gap-conditioned entry/exit decoding.
//!
//! Strict alternation breaks down when a counter-scan is missed: one forgotten
//! exit flips every later decision for that card. This strategy instead
//! labels scans with the cheapest entry/exit sequence under a cost model over
//! inter-scan gaps (a two-state Viterbi decode over negative log-likelihoods).
//!
//! 1. A scan within `debounce` of the previous kept scan is noise (two readers
//!    on one door, or a repeated tap)
//! 2. Remaining scans are decoded: closing a shift longer than `max_shift` is
//!    penalised, two entries in a row are cheap only across such a gap, and two
//!    exits in a row are always expensive
//! 3. Orphaned labels become noise so the usual interval invariants hold

use chrono::Duration;

use crate::event::ScanEvent;
use crate::interval::{EmployeeState, Occupancy};
use crate::matcher::{MatchOutcome, MatchStrategy, ScanDecision, ScanRole, scan_gaps};

/// Cost of a missed scan inside a plausible shift.
const MISSED_SCAN: f64 = 5.0;
/// Cost of closing a shift longer than `max_shift`.
const OVERLONG_SHIFT: f64 = 3.0;
/// Cost of a missed exit when the gap exceeds `max_shift`.
const MISSED_EXIT_ACROSS_GAP: f64 = 1.0;

/// Gap-aware matching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapAware {
    /// Scans closer than this to the previous kept scan are noise.
    pub debounce: Duration,
    /// Longest plausible shift.
    pub max_shift: Duration,
}

impl Default for GapAware {
    fn default() -> Self {
        Self {
            debounce: Duration::seconds(60),
            max_shift: Duration::hours(16),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Entry,
    Exit,
}

impl Label {
    const ALL: [Self; 2] = [Self::Entry, Self::Exit];

    const fn index(self) -> usize {
        match self {
            Self::Entry => 0,
            Self::Exit => 1,
        }
    }

    const fn flip(self) -> Self {
        match self {
            Self::Entry => Self::Exit,
            Self::Exit => Self::Entry,
        }
    }
}

impl GapAware {
    fn transition_cost(&self, prev: Label, next: Label, gap: Option<Duration>) -> f64 {
        let overlong = gap.is_some_and(|gap| gap > self.max_shift);
        match (prev, next) {
            (Label::Exit, Label::Entry) => 0.0,
            (Label::Entry, Label::Exit) if overlong => OVERLONG_SHIFT,
            (Label::Entry, Label::Exit) => 0.0,
            (Label::Entry, Label::Entry) if overlong => MISSED_EXIT_ACROSS_GAP,
            (Label::Entry, Label::Entry) | (Label::Exit, Label::Exit) => MISSED_SCAN,
        }
    }

    /// Decodes the cheapest label sequence.
    ///
    /// `start` is the label implied by the seed (an open interval acts as a
    /// preceding entry). Ties prefer strict alternation from `start`.
    fn decode(&self, start: Label, gaps: &[Option<Duration>]) -> Vec<Label> {
        if gaps.is_empty() {
            return Vec::new();
        }
        let alternating = |i: usize| if i % 2 == 0 { start.flip() } else { start };

        let mut cost = [0.0_f64; 2];
        let mut back: Vec<[Label; 2]> = Vec::with_capacity(gaps.len());
        for label in Label::ALL {
            cost[label.index()] = self.transition_cost(start, label, gaps[0]);
        }
        back.push([start, start]);

        for (i, gap) in gaps.iter().enumerate().skip(1) {
            let mut next_cost = [f64::INFINITY; 2];
            let mut next_back = [Label::Entry; 2];
            for label in Label::ALL {
                let preferred = alternating(i - 1);
                for prev in [preferred, preferred.flip()] {
                    let candidate = cost[prev.index()] + self.transition_cost(prev, label, *gap);
                    if candidate < next_cost[label.index()] {
                        next_cost[label.index()] = candidate;
                        next_back[label.index()] = prev;
                    }
                }
            }
            cost = next_cost;
            back.push(next_back);
        }

        let preferred = alternating(gaps.len() - 1);
        let mut label = if cost[preferred.flip().index()] < cost[preferred.index()] {
            preferred.flip()
        } else {
            preferred
        };
        let mut labels = vec![label; gaps.len()];
        for i in (1..gaps.len()).rev() {
            labels[i] = label;
            label = back[i][label.index()];
        }
        labels[0] = label;
        labels
    }
}

impl MatchStrategy for GapAware {
    fn classify(&self, seed: &EmployeeState, sorted: &[ScanEvent]) -> MatchOutcome {
        let gaps = scan_gaps(seed, sorted);

        let mut decisions: Vec<ScanDecision> = Vec::with_capacity(sorted.len());
        let mut kept: Vec<usize> = Vec::new();
        let mut kept_gaps: Vec<Option<Duration>> = Vec::new();
        let mut last_kept = seed.last_event.map(|event| event.timestamp);
        for (i, (event, gap)) in sorted.iter().zip(gaps).enumerate() {
            let since_kept = last_kept.map(|at| event.timestamp - at);
            let role = if since_kept.is_some_and(|since| since < self.debounce) {
                ScanRole::Noise
            } else {
                kept.push(i);
                kept_gaps.push(since_kept);
                last_kept = Some(event.timestamp);
                ScanRole::Entry
            };
            decisions.push(ScanDecision {
                event: event.clone(),
                role,
                gap,
            });
        }

        let start = match seed.occupancy {
            Occupancy::Inside => Label::Entry,
            Occupancy::Outside => Label::Exit,
        };
        let labels = self.decode(start, &kept_gaps);

        let mut state = seed.clone();
        let mut intervals = Vec::new();
        let mut open_decision: Option<usize> = None;
        let mut superseded = None;
        for (&i, label) in kept.iter().zip(labels) {
            let anchor = decisions[i].event.anchor();
            match label {
                Label::Entry => {
                    if let Some(abandoned) = state.abandon() {
                        match open_decision {
                            Some(orphan) => decisions[orphan].role = ScanRole::Noise,
                            None => superseded = Some(abandoned),
                        }
                        tracing::debug!(card = %seed.card, event_id = %anchor.id, "missed exit, entry superseded");
                    }
                    state.enter(anchor);
                    decisions[i].role = ScanRole::Entry;
                    open_decision = Some(i);
                }
                Label::Exit => match state.leave(anchor) {
                    Some(interval) => {
                        intervals.push(interval);
                        decisions[i].role = ScanRole::Exit;
                        open_decision = None;
                    }
                    None => {
                        tracing::debug!(card = %seed.card, event_id = %anchor.id, "exit without entry");
                        decisions[i].role = ScanRole::Noise;
                    }
                },
            }
        }
        intervals.extend(state.into_open());

        MatchOutcome {
            card: seed.card.clone(),
            decisions,
            intervals,
            superseded,
        }
    }
}
