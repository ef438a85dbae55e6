//! Intervals command for listing stored work intervals.

use std::io::Write;

use anyhow::{Context, Result};

use att_core::types::parse_timestamp;
use att_core::{Card, IntervalRecord};
use att_db::Database;

use super::format_duration;

pub fn run<W: Write>(writer: &mut W, db: &Database, card: Option<&str>, json: bool) -> Result<()> {
    let card = card.map(Card::new).transpose().context("invalid card")?;
    let records = db.list_intervals(card.as_ref())?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&records)?)?;
        return Ok(());
    }

    if records.is_empty() {
        writeln!(writer, "No intervals stored.")?;
        return Ok(());
    }
    for record in &records {
        writeln!(
            writer,
            "{}  {}  {:<19}  {:<8}  [{}]",
            record.card,
            record.entry_at,
            record.exit_at.as_deref().unwrap_or("open"),
            worked(record).unwrap_or_else(|| "-".to_string()),
            record.provenance
        )?;
    }
    Ok(())
}

fn worked(record: &IntervalRecord) -> Option<String> {
    let entry = parse_timestamp(&record.entry_at).ok()?;
    let exit = parse_timestamp(record.exit_at.as_deref()?).ok()?;
    Some(format_duration(exit - entry))
}
