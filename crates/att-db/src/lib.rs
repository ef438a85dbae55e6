//! Storage layer for attendance reconciliation.
//!
//! Provides persistence for employees, scan events and intervals using
//! `rusqlite`, implementing [`att_core::Store`].
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A run owns its `Database` for its whole duration; parallel matching never
//! touches it.
//!
//! # Idempotence
//!
//! Every write is expressed so that repeating it is harmless:
//! - employees: insert-if-absent on `card`, update only when a name differs
//! - events: insert-if-absent on `id`
//! - intervals: insert-if-absent on `entry_event_id`; closing only ever fills
//!   an exit that is still NULL
//!
//! Each batch runs in one transaction, so a failed batch leaves nothing behind.
//!
//! # Timestamp Format
//!
//! Timestamps are stored as TEXT in `%Y-%m-%dT%H:%M:%S` (the device's local
//! clock, second precision). Lexicographic order matches chronological order.

use std::path::Path;

use att_core::types::{TIMESTAMP_FORMAT, format_timestamp, parse_timestamp};
use att_core::{
    Card, Employee, EmployeeWrites, EventId, IntervalRecord, ScanEvent, Store, ValidationError,
};
use chrono::Local;
use rusqlite::{Connection, params};
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp in {table} row {key}: {timestamp}")]
    TimestampParse {
        table: &'static str,
        key: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored value violates a domain invariant.
    #[error("invalid value in {table} row {key}")]
    InvalidRow {
        table: &'static str,
        key: String,
        #[source]
        source: ValidationError,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// Row counts, for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub employees: i64,
    pub events: i64,
    pub intervals: i64,
    pub open_intervals: i64,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS employees (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                card TEXT NOT NULL UNIQUE,
                created_at TEXT
            );

            -- Scan events, keyed by the device-assigned ID
            -- timestamp: device local time, '%Y-%m-%dT%H:%M:%S'
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY,
                card TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_card ON events(card, timestamp);

            -- Work intervals; an open interval has both exit columns NULL
            CREATE TABLE IF NOT EXISTS intervals (
                entry_at TEXT NOT NULL,
                exit_at TEXT,
                card TEXT NOT NULL,
                provenance TEXT NOT NULL,
                entry_event_id INTEGER NOT NULL UNIQUE,
                exit_event_id INTEGER,
                CHECK ((exit_at IS NULL) = (exit_event_id IS NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_intervals_card ON intervals(card, entry_at);
            ",
        )?;
        Ok(())
    }

    /// Returns row counts per table.
    pub fn counts(&self) -> Result<StoreCounts, DbError> {
        let count = |sql: &str| -> Result<i64, DbError> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };
        Ok(StoreCounts {
            employees: count("SELECT COUNT(*) FROM employees")?,
            events: count("SELECT COUNT(*) FROM events")?,
            intervals: count("SELECT COUNT(*) FROM intervals")?,
            open_intervals: count("SELECT COUNT(*) FROM intervals WHERE exit_event_id IS NULL")?,
        })
    }

    /// Returns the latest stored event timestamp, if any.
    pub fn last_event_at(&self) -> Result<Option<String>, DbError> {
        Ok(self
            .conn
            .query_row("SELECT MAX(timestamp) FROM events", [], |row| row.get(0))?)
    }

    /// Lists stored intervals for one card, or all cards, in entry order.
    pub fn list_intervals(&self, card: Option<&Card>) -> Result<Vec<IntervalRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT entry_at, exit_at, card, provenance, entry_event_id, exit_event_id
            FROM intervals
            WHERE ?1 IS NULL OR card = ?1
            ORDER BY card ASC, entry_at ASC, entry_event_id ASC
            ",
        )?;
        let rows = stmt.query_map([card.map(Card::as_str)], IntervalRow::from_row)?;
        let mut intervals = Vec::new();
        for row in rows {
            intervals.push(row?.into_record()?);
        }
        Ok(intervals)
    }

    /// Lists stored events for one card in time order.
    pub fn list_events(&self, card: &Card) -> Result<Vec<ScanEvent>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, card, timestamp
            FROM events
            WHERE card = ?
            ORDER BY timestamp ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map([card.as_str()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut events = Vec::new();
        for row in rows {
            let (id, card, timestamp) = row?;
            let key = id.to_string();
            events.push(ScanEvent {
                id: EventId::new(id).map_err(invalid("events", &key))?,
                card: Card::new(card).map_err(invalid("events", &key))?,
                timestamp: parse_timestamp(&timestamp).map_err(|source| {
                    DbError::TimestampParse {
                        table: "events",
                        key: key.clone(),
                        timestamp: timestamp.clone(),
                        source,
                    }
                })?,
            });
        }
        Ok(events)
    }
}

impl Store for Database {
    type Error = DbError;

    fn all_employees(&self) -> Result<Vec<Employee>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT card, first_name, last_name FROM employees ORDER BY card ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut employees = Vec::new();
        for row in rows {
            let (card, first_name, last_name) = row?;
            employees.push(Employee {
                card: Card::new(card).map_err(invalid("employees", "<empty card>"))?,
                first_name,
                last_name,
            });
        }
        Ok(employees)
    }

    fn upsert_employees(
        &mut self,
        insert: &[Employee],
        update: &[Employee],
    ) -> Result<EmployeeWrites, DbError> {
        if insert.is_empty() && update.is_empty() {
            return Ok(EmployeeWrites::default());
        }
        let created_at = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let tx = self.conn.transaction()?;
        let mut writes = EmployeeWrites::default();
        {
            let mut stmt = tx.prepare(
                "
                UPDATE employees
                SET first_name = ?1, last_name = ?2
                WHERE card = ?3 AND (first_name <> ?1 OR last_name <> ?2)
                ",
            )?;
            for employee in update {
                writes.updated += stmt.execute(params![
                    employee.first_name,
                    employee.last_name,
                    employee.card.as_str(),
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO employees (first_name, last_name, card, created_at)
                VALUES (?, ?, ?, ?)
                ",
            )?;
            for employee in insert {
                writes.inserted += stmt.execute(params![
                    employee.first_name,
                    employee.last_name,
                    employee.card.as_str(),
                    created_at,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(
            inserted = writes.inserted,
            updated = writes.updated,
            "employees written"
        );
        Ok(writes)
    }

    fn upsert_events(&mut self, events: &[ScanEvent]) -> Result<usize, DbError> {
        if events.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO events (id, card, timestamp) VALUES (?, ?, ?)")?;
            for event in events {
                inserted += stmt.execute(params![
                    event.id.get(),
                    event.card.as_str(),
                    format_timestamp(event.timestamp),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn upsert_intervals(&mut self, intervals: &[IntervalRecord]) -> Result<usize, DbError> {
        if intervals.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO intervals
                (entry_at, exit_at, card, provenance, entry_event_id, exit_event_id)
                VALUES (?, ?, ?, ?, ?, ?)
                ",
            )?;
            for record in intervals {
                inserted += stmt.execute(params![
                    record.entry_at,
                    record.exit_at,
                    record.card.as_str(),
                    record.provenance,
                    record.entry_event_id.get(),
                    record.exit_event_id.map(EventId::get),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn open_intervals(&self) -> Result<Vec<IntervalRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT entry_at, exit_at, card, provenance, entry_event_id, exit_event_id
            FROM intervals
            WHERE exit_event_id IS NULL
            ORDER BY card ASC, entry_at ASC
            ",
        )?;
        let rows = stmt.query_map([], IntervalRow::from_row)?;
        let mut intervals = Vec::new();
        for row in rows {
            intervals.push(row?.into_record()?);
        }
        Ok(intervals)
    }

    fn close_open_intervals(&mut self, closed: &[IntervalRecord]) -> Result<usize, DbError> {
        if closed.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare(
                "
                UPDATE intervals
                SET exit_at = ?, exit_event_id = ?
                WHERE entry_event_id = ? AND exit_event_id IS NULL
                ",
            )?;
            for record in closed.iter().filter(|record| !record.is_open()) {
                updated += stmt.execute(params![
                    record.exit_at,
                    record.exit_event_id.map(EventId::get),
                    record.entry_event_id.get(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }
}

#[derive(Debug)]
struct IntervalRow {
    entry_at: String,
    exit_at: Option<String>,
    card: String,
    provenance: String,
    entry_event_id: i64,
    exit_event_id: Option<i64>,
}

impl IntervalRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entry_at: row.get(0)?,
            exit_at: row.get(1)?,
            card: row.get(2)?,
            provenance: row.get(3)?,
            entry_event_id: row.get(4)?,
            exit_event_id: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<IntervalRecord, DbError> {
        let key = self.entry_event_id.to_string();
        parse_timestamp(&self.entry_at).map_err(|source| DbError::TimestampParse {
            table: "intervals",
            key: key.clone(),
            timestamp: self.entry_at.clone(),
            source,
        })?;
        Ok(IntervalRecord {
            entry_at: self.entry_at,
            exit_at: self.exit_at,
            card: Card::new(self.card).map_err(invalid("intervals", &key))?,
            provenance: self.provenance,
            entry_event_id: EventId::new(self.entry_event_id).map_err(invalid("intervals", &key))?,
            exit_event_id: self
                .exit_event_id
                .map(EventId::new)
                .transpose()
                .map_err(invalid("intervals", &key))?,
        })
    }
}

fn invalid(table: &'static str, key: &str) -> impl FnOnce(ValidationError) -> DbError {
    let key = key.to_string();
    move |source| DbError::InvalidRow { table, key, source }
}
