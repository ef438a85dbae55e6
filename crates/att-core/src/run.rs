//! One reconciliation run: source → matcher → assembler → store.
//!
//! Collaborator failures abort the run at the failing stage. Integrity
//! violations are collected into the summary instead. All writes are
//! idempotent, so a failed run can simply be repeated.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::error::Error as StdError;
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::assemble::{IntervalRecord, assemble};
use crate::event::EventRef;
use crate::interval::Interval;
use crate::matcher::MatchStrategy;
use crate::reconstruct::{ReconstructParams, reconstruct};
use crate::roster::diff_roster;
use crate::skip::{SkipReason, SkippedRecord};
use crate::source::EventSource;
use crate::store::Store;
use crate::types::{Card, EventId, Window, parse_timestamp};

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The point in a run where a collaborator failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ListEmployees,
    ListEvents,
    LoadRoster,
    LoadOpenIntervals,
    WriteEmployees,
    WriteEvents,
    WriteIntervals,
    CloseIntervals,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ListEmployees => "listing employees",
            Self::ListEvents => "listing events",
            Self::LoadRoster => "loading the stored roster",
            Self::LoadOpenIntervals => "loading open intervals",
            Self::WriteEmployees => "writing employees",
            Self::WriteEvents => "writing events",
            Self::WriteIntervals => "writing intervals",
            Self::CloseIntervals => "closing open intervals",
        };
        f.write_str(s)
    }
}

/// Run-level failures.
#[derive(Debug, Error)]
pub enum RunError {
    /// The event source failed.
    #[error("event source failed while {stage}")]
    Source {
        stage: Stage,
        #[source]
        source: BoxError,
    },
    /// The store failed.
    #[error("store failed while {stage}")]
    Store {
        stage: Stage,
        #[source]
        source: BoxError,
    },
    /// The matching worker pool could not be started.
    #[error("failed to start matching workers")]
    Workers(#[from] rayon::ThreadPoolBuildError),
}

impl RunError {
    fn at_source<E: StdError + Send + Sync + 'static>(stage: Stage) -> impl FnOnce(E) -> Self {
        move |err| Self::Source {
            stage,
            source: Box::new(err),
        }
    }

    fn at_store<E: StdError + Send + Sync + 'static>(stage: Stage) -> impl FnOnce(E) -> Self {
        move |err| Self::Store {
            stage,
            source: Box::new(err),
        }
    }

    /// Returns the stage that failed, if any.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Source { stage, .. } | Self::Store { stage, .. } => Some(*stage),
            Self::Workers(_) => None,
        }
    }
}

/// Parameters for one run.
pub struct RunOptions {
    pub window: Window,
    /// Provenance tag written on every interval.
    pub provenance: String,
    /// Matching worker threads; `0` lets rayon decide.
    pub concurrency: usize,
    pub strategy: Box<dyn MatchStrategy>,
    /// Start cards from intervals the store still holds open.
    pub resume_open_intervals: bool,
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("window", &self.window)
            .field("provenance", &self.provenance)
            .field("concurrency", &self.concurrency)
            .field("resume_open_intervals", &self.resume_open_intervals)
            .finish_non_exhaustive()
    }
}

/// What a completed run wrote and skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub employees_inserted: usize,
    pub employees_updated: usize,
    pub employees_unchanged: usize,
    pub events_received: usize,
    pub events_inserted: usize,
    pub intervals_formed: usize,
    pub intervals_inserted: usize,
    pub intervals_closed: usize,
    pub scans_discarded: usize,
    pub skipped: Vec<SkippedRecord>,
}

impl RunSummary {
    /// Skipped record counts, by reason.
    #[must_use]
    pub fn skipped_by_reason(&self) -> BTreeMap<SkipReason, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.skipped {
            *counts.entry(record.reason).or_insert(0) += 1;
        }
        counts
    }
}

/// Runs one full reconciliation.
pub fn run<S, T>(source: &S, store: &mut T, options: &RunOptions) -> Result<RunSummary, RunError>
where
    S: EventSource,
    T: Store,
{
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id, window_months = options.window.months);
    let _guard = span.enter();

    let observed = source
        .list_employees()
        .map_err(RunError::at_source(Stage::ListEmployees))?;
    tracing::info!(count = observed.len(), "listed employees");

    let raw = source
        .list_events(&options.window)
        .map_err(RunError::at_source(Stage::ListEvents))?;
    let events_received = raw.len();
    tracing::info!(count = events_received, since = %options.window.start, "listed events");

    let existing = store
        .all_employees()
        .map_err(RunError::at_store(Stage::LoadRoster))?;

    let open = if options.resume_open_intervals {
        let stored = store
            .open_intervals()
            .map_err(RunError::at_store(Stage::LoadOpenIntervals))?;
        open_by_card(stored)
    } else {
        HashMap::new()
    };

    let params = ReconstructParams {
        window: &options.window,
        roster: &observed,
        open: &open,
        strategy: options.strategy.as_ref(),
        concurrency: options.concurrency,
    };
    let (diff, reconstruction) = rayon::join(
        || diff_roster(&observed, &existing),
        || reconstruct(raw, &params),
    );
    let reconstruction = reconstruction?;

    let mut known: HashSet<EventId> = reconstruction.accepted.iter().map(|e| e.id).collect();
    known.extend(reconstruction.resumed.iter().copied());
    let assembly = assemble(&reconstruction.outcomes, &options.provenance, &known);

    let employees = store
        .upsert_employees(&diff.insert, &diff.update)
        .map_err(RunError::at_store(Stage::WriteEmployees))?;
    tracing::info!(
        inserted = employees.inserted,
        updated = employees.updated,
        "synced employees"
    );

    let events_inserted = store
        .upsert_events(&reconstruction.accepted)
        .map_err(RunError::at_store(Stage::WriteEvents))?;
    tracing::info!(inserted = events_inserted, "inserted events");

    let (to_close, to_insert): (Vec<IntervalRecord>, Vec<IntervalRecord>) = assembly
        .records
        .iter()
        .cloned()
        .partition(|record| reconstruction.resumed.contains(&record.entry_event_id));
    let intervals_inserted = store
        .upsert_intervals(&to_insert)
        .map_err(RunError::at_store(Stage::WriteIntervals))?;
    tracing::info!(inserted = intervals_inserted, "inserted intervals");

    let to_close: Vec<IntervalRecord> = to_close.into_iter().filter(|r| !r.is_open()).collect();
    let intervals_closed = if to_close.is_empty() {
        0
    } else {
        store
            .close_open_intervals(&to_close)
            .map_err(RunError::at_store(Stage::CloseIntervals))?
    };

    let mut skipped = reconstruction.skipped;
    skipped.extend(
        diff.duplicates
            .iter()
            .map(|employee| SkippedRecord::new(SkipReason::DuplicateEmployee, &employee.card)),
    );
    skipped.extend(assembly.skipped);
    skipped.extend(
        reconstruction
            .outcomes
            .iter()
            .filter_map(|outcome| outcome.superseded.as_ref())
            .map(|open| SkippedRecord::new(SkipReason::SupersededOpen, open.entry.id)),
    );
    if !skipped.is_empty() {
        tracing::warn!(count = skipped.len(), "records skipped");
    }

    let summary = RunSummary {
        employees_inserted: employees.inserted,
        employees_updated: employees.updated,
        employees_unchanged: diff.unchanged.len(),
        events_received,
        events_inserted,
        intervals_formed: assembly.records.len(),
        intervals_inserted,
        intervals_closed,
        scans_discarded: reconstruction
            .outcomes
            .iter()
            .map(crate::matcher::MatchOutcome::discarded)
            .sum(),
        skipped,
    };
    tracing::info!("run completed");
    Ok(summary)
}

/// Indexes store-open intervals by card, keeping the latest entry per card.
fn open_by_card(stored: Vec<IntervalRecord>) -> HashMap<Card, Interval> {
    let mut open: HashMap<Card, Interval> = HashMap::new();
    for record in stored {
        let timestamp = match parse_timestamp(&record.entry_at) {
            Ok(timestamp) => timestamp,
            Err(err) => {
                tracing::warn!(entry_event_id = %record.entry_event_id, error = %err, "unreadable open interval");
                continue;
            }
        };
        let interval = Interval::open(
            record.card.clone(),
            EventRef {
                id: record.entry_event_id,
                timestamp,
            },
        );
        match open.get(&record.card) {
            Some(current) if current.entry.timestamp >= timestamp => {}
            _ => {
                open.insert(record.card, interval);
            }
        }
    }
    open
}
