//! Event source backed by a device export directory.
//!
//! The exporter writes two JSONL files:
//! - `employees.jsonl`: `{"card": "...", "first_name": "...", "last_name": "..."}`
//! - `events.jsonl`: `{"id": 1, "card": "...", "timestamp": "2025-01-06T08:58:00"}`
//!
//! Timestamps are the device's local clock in `%Y-%m-%dT%H:%M:%S`.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use att_core::types::parse_timestamp;
use att_core::{Card, Employee, EventId, EventSource, ScanEvent, ValidationError, Window};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

pub const EMPLOYEES_FILE: &str = "employees.jsonl";
pub const EVENTS_FILE: &str = "events.jsonl";

/// Errors reading an export directory.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {} on line {line}", .path.display())]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid record in {} on line {line}", .path.display())]
    Invalid {
        path: PathBuf,
        line: usize,
        #[source]
        source: ValidationError,
    },
    #[error("invalid timestamp in {} on line {line}", .path.display())]
    Timestamp {
        path: PathBuf,
        line: usize,
        #[source]
        source: chrono::ParseError,
    },
}

/// A directory produced by the device exporter.
#[derive(Debug, Clone)]
pub struct ExportDir {
    dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct EventLine {
    id: i64,
    card: String,
    timestamp: String,
}

impl ExportDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Reads every non-blank line of `name`, tagged with its 1-based line number.
    fn read_lines<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<(usize, T)>, ExportError> {
        let path = self.dir.join(name);
        let file = File::open(&path).map_err(|source| ExportError::Io {
            path: path.clone(),
            source,
        })?;
        parse_lines(BufReader::new(file), &path)
    }
}

fn parse_lines<R: BufRead, T: DeserializeOwned>(
    reader: R,
    path: &Path,
) -> Result<Vec<(usize, T)>, ExportError> {
    let mut rows = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed = serde_json::from_str(trimmed).map_err(|source| ExportError::Json {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        rows.push((idx + 1, parsed));
    }
    Ok(rows)
}

impl EventSource for ExportDir {
    type Error = ExportError;

    fn list_employees(&self) -> Result<Vec<Employee>, ExportError> {
        Ok(self
            .read_lines::<Employee>(EMPLOYEES_FILE)?
            .into_iter()
            .map(|(_, employee)| employee)
            .collect())
    }

    fn list_events(&self, window: &Window) -> Result<Vec<ScanEvent>, ExportError> {
        let path = self.dir.join(EVENTS_FILE);
        let mut events = Vec::new();
        for (line, raw) in self.read_lines::<EventLine>(EVENTS_FILE)? {
            let invalid = |source| ExportError::Invalid {
                path: path.clone(),
                line,
                source,
            };
            let timestamp =
                parse_timestamp(&raw.timestamp).map_err(|source| ExportError::Timestamp {
                    path: path.clone(),
                    line,
                    source,
                })?;
            if !window.contains(timestamp) {
                continue;
            }
            events.push(ScanEvent {
                id: EventId::new(raw.id).map_err(invalid)?,
                card: Card::new(raw.card).map_err(invalid)?,
                timestamp,
            });
        }
        tracing::debug!(dir = %self.dir.display(), count = events.len(), "read export events");
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::NaiveDate;

    use super::*;

    fn window() -> Window {
        let now = NaiveDate::from_ymd_opt(2025, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Window::trailing(1, now).unwrap()
    }

    fn export(employees: &str, events: &str) -> (tempfile::TempDir, ExportDir) {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join(EMPLOYEES_FILE), employees).unwrap();
        fs::write(temp.path().join(EVENTS_FILE), events).unwrap();
        let dir = ExportDir::new(temp.path());
        (temp, dir)
    }

    #[test]
    fn test_reads_roster_and_skips_blank_lines() {
        let (_temp, dir) = export(
            "{\"card\":\"C1\",\"first_name\":\"Ann\",\"last_name\":\"Lee\"}\n\n{\"card\":\"C2\",\"first_name\":\"Bo\",\"last_name\":\"Kim\"}\n",
            "",
        );
        let employees = dir.list_employees().unwrap();
        let cards: Vec<&str> = employees.iter().map(|e| e.card.as_str()).collect();
        assert_eq!(cards, vec!["C1", "C2"]);
    }

    #[test]
    fn test_events_before_window_are_not_listed() {
        let (_temp, dir) = export(
            "",
            "{\"id\":1,\"card\":\"C1\",\"timestamp\":\"2024-12-20T09:00:00\"}\n{\"id\":2,\"card\":\"C1\",\"timestamp\":\"2025-01-06T09:00:00\"}\n",
        );
        let events = dir.list_events(&window()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.get(), 2);
    }

    #[test]
    fn test_malformed_line_names_file_and_line() {
        let (_temp, dir) = export(
            "",
            "{\"id\":1,\"card\":\"C1\",\"timestamp\":\"2025-01-06T09:00:00\"}\nnot json\n",
        );
        let err = dir.list_events(&window()).unwrap_err();
        assert!(matches!(err, ExportError::Json { line: 2, .. }));
        assert!(err.to_string().contains("events.jsonl on line 2"));
    }

    #[test]
    fn test_zero_event_id_is_rejected() {
        let (_temp, dir) = export(
            "",
            "{\"id\":0,\"card\":\"C1\",\"timestamp\":\"2025-01-06T09:00:00\"}\n",
        );
        let err = dir.list_events(&window()).unwrap_err();
        assert!(matches!(
            err,
            ExportError::Invalid {
                line: 1,
                source: ValidationError::NonPositiveEventId { value: 0 },
                ..
            }
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let dir = ExportDir::new(temp.path());
        assert!(matches!(
            dir.list_employees(),
            Err(ExportError::Io { .. })
        ));
    }
}
