//! Integration tests for the run pipeline: export dir → att run → store.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use chrono::{Duration, Local, NaiveDateTime};
use tempfile::TempDir;

fn att(home: &Path, config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_att"))
        .env("XDG_CONFIG_HOME", home)
        .env("HOME", home)
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("failed to run att")
}

fn stamp(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Writes an export with one closed and one open interval for C1 and a
/// single scan for C2, all a few days back so they fall inside the window.
fn setup(events_extra: &str) -> (TempDir, std::path::PathBuf) {
    let temp = TempDir::new().unwrap();
    let export = temp.path().join("export");
    fs::create_dir_all(&export).unwrap();

    fs::write(
        export.join("employees.jsonl"),
        "{\"card\":\"C1\",\"first_name\":\"Ann\",\"last_name\":\"Lee\"}\n{\"card\":\"C2\",\"first_name\":\"Bo\",\"last_name\":\"Kim\"}\n",
    )
    .unwrap();

    let day = Local::now().naive_local() - Duration::days(3);
    let base = day.date().and_hms_opt(8, 0, 0).unwrap();
    let events = [
        (1, "C1", base),
        (2, "C1", base + Duration::hours(8)),
        (3, "C1", base + Duration::hours(24)),
        (4, "C2", base + Duration::minutes(30)),
    ]
    .iter()
    .map(|(id, card, at)| {
        format!(
            "{{\"id\":{id},\"card\":\"{card}\",\"timestamp\":\"{}\"}}\n",
            stamp(*at)
        )
    })
    .collect::<String>();
    fs::write(export.join("events.jsonl"), events + events_extra).unwrap();

    let config = temp.path().join("config.toml");
    fs::write(
        &config,
        format!(
            "database_path = \"{}\"\nexport_dir = \"{}\"\nprovenance = \"north-gate\"\n",
            temp.path().join("att.db").display(),
            export.display()
        ),
    )
    .unwrap();

    (temp, config)
}

#[test]
fn test_run_is_idempotent_end_to_end() {
    let (temp, config) = setup("");

    let first = att(temp.path(), &config, &["run"]);
    assert!(
        first.status.success(),
        "first run failed: {}",
        String::from_utf8_lossy(&first.stderr)
    );
    let stdout = String::from_utf8_lossy(&first.stdout);
    assert!(
        stdout.contains("Intervals: 3 formed, 3 inserted, 0 closed"),
        "unexpected summary: {stdout}"
    );

    let second = att(temp.path(), &config, &["run"]);
    assert!(second.status.success());
    let stdout = String::from_utf8_lossy(&second.stdout);
    assert!(stdout.contains("Employees: 0 inserted, 0 updated, 2 unchanged"));
    assert!(stdout.contains("Events: 4 received, 0 inserted"));
    assert!(stdout.contains("Intervals: 3 formed, 0 inserted, 0 closed"));

    let status = att(temp.path(), &config, &["status"]);
    assert!(status.status.success());
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("Intervals: 3 (2 open)"), "{stdout}");
}

#[test]
fn test_intervals_json_lists_card() {
    let (temp, config) = setup("");
    assert!(att(temp.path(), &config, &["run"]).status.success());

    let output = att(temp.path(), &config, &["intervals", "--card", "C1", "--json"]);
    assert!(output.status.success());
    let records: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["entry_event_id"], 1);
    assert_eq!(records[0]["exit_event_id"], 2);
    assert_eq!(records[0]["provenance"], "north-gate");
    assert!(records[1].get("exit_event_id").is_none());
}

#[test]
fn test_window_override_excludes_old_scans() {
    let (temp, config) = setup("");
    let old = stamp(Local::now().naive_local() - Duration::days(200));
    let export = temp.path().join("export").join("events.jsonl");
    let mut events = fs::read_to_string(&export).unwrap();
    events.push_str(&format!(
        "{{\"id\":9,\"card\":\"C2\",\"timestamp\":\"{old}\"}}\n"
    ));
    fs::write(&export, events).unwrap();

    let output = att(temp.path(), &config, &["run", "--window", "1"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("window: 1 months"));
    assert!(stdout.contains("Events: 4 received, 4 inserted"));
}

#[test]
fn test_malformed_export_fails_without_writing() {
    let (temp, config) = setup("this is not json\n");

    let output = att(temp.path(), &config, &["run"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("events.jsonl on line 5"),
        "expected line number in error: {stderr}"
    );

    let status = att(temp.path(), &config, &["status"]);
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("Employees: 0"), "{stdout}");
    assert!(stdout.contains("No events recorded."));
}
