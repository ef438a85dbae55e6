//! Status command for showing what the store holds.

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use att_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let counts = db.counts()?;

    writeln!(writer, "Attendance status")?;
    writeln!(writer, "Database: {}", database_path.display())?;
    writeln!(writer, "Employees: {}", counts.employees)?;

    match db.last_event_at()? {
        Some(last) => writeln!(writer, "Events: {} (latest {last})", counts.events)?,
        None => {
            writeln!(writer, "No events recorded.")?;
            return Ok(());
        }
    }
    writeln!(
        writer,
        "Intervals: {} ({} open)",
        counts.intervals, counts.open_intervals
    )?;

    Ok(())
}
