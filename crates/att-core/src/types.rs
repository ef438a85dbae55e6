//! Core type definitions with validation.

use std::fmt;

use chrono::{Months, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timestamp layout used for storage-ready records (ISO 8601, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// Event identifiers are positive; zero is reserved for "absent".
    #[error("event ID must be positive, got {value}")]
    NonPositiveEventId { value: i64 },

    /// The history window could not be computed.
    #[error("window of {months} months is out of range")]
    WindowOutOfRange { months: u32 },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// An access card identifier.
    ///
    /// The card groups scan events into one employee's stream and is the
    /// unique key of the roster.
    Card, "card"
);

/// A source-assigned scan event identifier.
///
/// Always positive, so an absent exit is `Option::None` and never `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct EventId(i64);

impl EventId {
    /// Creates a new event ID after validation.
    pub const fn new(id: i64) -> Result<Self, ValidationError> {
        if id <= 0 {
            return Err(ValidationError::NonPositiveEventId { value: id });
        }
        Ok(Self(id))
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for EventId {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EventId> for i64 {
    fn from(id: EventId) -> Self {
        id.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The trailing span of history considered by one run.
///
/// The same window bounds both the event query and interval formation, so an
/// interval's entry and exit always come from one queried range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Length of the window in calendar months.
    pub months: u32,
    /// Earliest timestamp (inclusive) inside the window.
    pub start: NaiveDateTime,
}

impl Window {
    /// Builds the window ending at `now` and reaching `months` back.
    pub fn trailing(months: u32, now: NaiveDateTime) -> Result<Self, ValidationError> {
        let start = now
            .checked_sub_months(Months::new(months))
            .ok_or(ValidationError::WindowOutOfRange { months })?;
        Ok(Self { months, start })
    }

    /// Returns whether `timestamp` falls inside the window.
    #[must_use]
    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        timestamp >= self.start
    }
}

/// Formats a timestamp the way storage-ready records carry it.
#[must_use]
pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a timestamp in [`TIMESTAMP_FORMAT`].
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
}
