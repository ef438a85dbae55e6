//! Run command: one reconciliation from the export into the store.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;

use att_core::{RunOptions, RunSummary};
use att_db::Database;

use crate::cli::RunArgs;
use crate::export::ExportDir;
use crate::Config;

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    config: &Config,
    args: &RunArgs,
    now: NaiveDateTime,
) -> Result<RunSummary> {
    let export_dir = args
        .export_dir
        .as_ref()
        .or(config.export_dir.as_ref())
        .context("no export directory configured (set export_dir or pass --export-dir)")?;
    let source = ExportDir::new(export_dir);

    let options = RunOptions {
        window: config
            .window(args.window, now)
            .context("invalid run window")?,
        provenance: args
            .provenance
            .clone()
            .unwrap_or_else(|| config.provenance.clone()),
        concurrency: config.concurrency,
        strategy: config.match_strategy()?,
        resume_open_intervals: config.resume_open_intervals,
    };
    tracing::debug!(?options, export_dir = %export_dir.display(), "starting run");

    let summary = att_core::run(&source, db, &options).context("reconciliation run failed")?;
    write_summary(writer, &options, &summary)?;
    Ok(summary)
}

fn write_summary<W: Write>(writer: &mut W, options: &RunOptions, summary: &RunSummary) -> Result<()> {
    writeln!(
        writer,
        "Run complete (window: {} months, provenance: {})",
        options.window.months, options.provenance
    )?;
    writeln!(
        writer,
        "Employees: {} inserted, {} updated, {} unchanged",
        summary.employees_inserted, summary.employees_updated, summary.employees_unchanged
    )?;
    writeln!(
        writer,
        "Events: {} received, {} inserted",
        summary.events_received, summary.events_inserted
    )?;
    writeln!(
        writer,
        "Intervals: {} formed, {} inserted, {} closed",
        summary.intervals_formed, summary.intervals_inserted, summary.intervals_closed
    )?;
    writeln!(writer, "Scans discarded: {}", summary.scans_discarded)?;
    writeln!(writer, "Skipped: {}", summary.skipped.len())?;
    for (reason, count) in summary.skipped_by_reason() {
        writeln!(writer, "  {reason}: {count}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::NaiveDate;
    use insta::assert_snapshot;

    use super::*;
    use crate::export::{EMPLOYEES_FILE, EVENTS_FILE};

    const EMPLOYEES: &str = r#"{"card":"C1","first_name":"Ann","last_name":"Lee"}
{"card":"C2","first_name":"Bo","last_name":"Kim"}
"#;

    const EVENTS: &str = r#"{"id":1,"card":"C1","timestamp":"2025-01-06T08:58:00"}
{"id":2,"card":"C1","timestamp":"2025-01-06T17:03:00"}
{"id":3,"card":"C1","timestamp":"2025-01-07T09:02:00"}
{"id":4,"card":"C2","timestamp":"2025-01-06T09:00:00"}
{"id":5,"card":"C9","timestamp":"2025-01-06T10:00:00"}
{"id":6,"card":"C2","timestamp":"2024-11-01T09:00:00"}
"#;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn export_dir() -> tempfile::TempDir {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join(EMPLOYEES_FILE), EMPLOYEES).unwrap();
        fs::write(temp.path().join(EVENTS_FILE), EVENTS).unwrap();
        temp
    }

    #[test]
    fn test_run_command_prints_summary() {
        let export = export_dir();
        let mut db = Database::open_in_memory().unwrap();
        let config = Config {
            export_dir: Some(export.path().to_path_buf()),
            ..Config::default()
        };

        let mut output = Vec::new();
        run(&mut output, &mut db, &config, &RunArgs::default(), now()).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap());
    }

    #[test]
    fn test_second_run_writes_nothing_new() {
        let export = export_dir();
        let mut db = Database::open_in_memory().unwrap();
        let config = Config::default();
        let args = RunArgs {
            export_dir: Some(export.path().to_path_buf()),
            provenance: Some("north-gate".to_string()),
            ..RunArgs::default()
        };

        let first = run(&mut Vec::new(), &mut db, &config, &args, now()).unwrap();
        let second = run(&mut Vec::new(), &mut db, &config, &args, now()).unwrap();

        assert_eq!(first.intervals_inserted, 3);
        assert_eq!(second.employees_inserted, 0);
        assert_eq!(second.employees_unchanged, 2);
        assert_eq!(second.events_inserted, 0);
        assert_eq!(second.intervals_inserted, 0);
        let stored = db.list_intervals(None).unwrap();
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|record| record.provenance == "north-gate"));
    }

    #[test]
    fn test_missing_export_dir_is_reported() {
        let mut db = Database::open_in_memory().unwrap();
        let err = run(
            &mut Vec::new(),
            &mut db,
            &Config::default(),
            &RunArgs::default(),
            now(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("no export directory configured"));
    }
}
