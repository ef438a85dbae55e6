//! Trace command: replay one card's stored scans through the matcher.
//!
//! Shows the role and gap of every scan, which is the quickest way to see why
//! an interval came out the way it did. The replay starts outside, from the
//! stored scans inside the configured window, like a run without resume.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;

use att_core::types::format_timestamp;
use att_core::{Card, EmployeeState, ScanRole, match_employee};
use att_db::Database;

use super::format_duration;
use crate::Config;

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    card: &str,
    now: NaiveDateTime,
) -> Result<()> {
    let card = Card::new(card).context("invalid card")?;
    let window = config.window(None, now).context("invalid window")?;
    let mut events = db
        .list_events(&card)
        .with_context(|| format!("failed to load events for {card}"))?;
    events.retain(|event| window.contains(event.timestamp));

    if events.is_empty() {
        writeln!(writer, "No events stored for card {card}.")?;
        return Ok(());
    }

    let strategy = config.match_strategy()?;
    let outcome = match_employee(EmployeeState::outside(card.clone()), events, strategy.as_ref());

    writeln!(writer, "Trace for {card} ({})", config.strategy.as_str())?;
    for decision in &outcome.decisions {
        let role = match decision.role {
            ScanRole::Entry => "entry",
            ScanRole::Exit => "exit",
            ScanRole::Noise => "noise",
        };
        let gap = decision
            .gap
            .map(|gap| format!("+{}", format_duration(gap)))
            .unwrap_or_default();
        let line = format!(
            "{}  #{:<6}{role:<7}{gap}",
            format_timestamp(decision.event.timestamp),
            decision.event.id.get(),
        );
        writeln!(writer, "{}", line.trim_end())?;
    }

    let open = usize::from(outcome.open_interval().is_some());
    writeln!(
        writer,
        "Intervals: {} ({open} open), discarded: {}",
        outcome.intervals.len(),
        outcome.discarded()
    )?;
    Ok(())
}
