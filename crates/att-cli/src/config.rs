//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use att_core::{Alternating, GapAware, MatchStrategy, ValidationError, Window};
use chrono::{Duration, NaiveDateTime};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Which entry/exit classifier a run uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    #[default]
    Alternating,
    GapAware,
}

impl StrategyKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alternating => "alternating",
            Self::GapAware => "gap-aware",
        }
    }
}

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Directory holding the device export.
    pub export_dir: Option<PathBuf>,
    /// Trailing window, in months.
    pub window_months: u32,
    /// Provenance tag written on every interval.
    pub provenance: String,
    /// Matching worker threads; `0` picks one per core.
    pub concurrency: usize,
    pub strategy: StrategyKind,
    /// Gap-aware only: scans this close together count once.
    pub debounce_secs: i64,
    /// Gap-aware only: longest plausible shift.
    pub max_shift_hours: i64,
    /// Continue intervals the store still holds open.
    pub resume_open_intervals: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("export_dir", &self.export_dir)
            .field("window_months", &self.window_months)
            .field("provenance", &self.provenance)
            .field("concurrency", &self.concurrency)
            .field("strategy", &self.strategy)
            .field("resume_open_intervals", &self.resume_open_intervals)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("att.db"),
            export_dir: None,
            window_months: 2,
            provenance: "default".to_string(),
            concurrency: 0,
            strategy: StrategyKind::default(),
            debounce_secs: 60,
            max_shift_hours: 16,
            resume_open_intervals: false,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (ATT_*)
        figment = figment.merge(Env::prefixed("ATT_"));

        figment.extract()
    }

    /// Builds the configured matching strategy.
    ///
    /// Rejects a negative debounce, a non-positive shift length, and values
    /// too large to represent as a duration.
    pub fn match_strategy(&self) -> anyhow::Result<Box<dyn MatchStrategy>> {
        anyhow::ensure!(
            self.debounce_secs >= 0,
            "debounce_secs must not be negative, got {}",
            self.debounce_secs
        );
        anyhow::ensure!(
            self.max_shift_hours > 0,
            "max_shift_hours must be positive, got {}",
            self.max_shift_hours
        );
        let debounce = Duration::try_seconds(self.debounce_secs)
            .with_context(|| format!("debounce_secs is out of range: {}", self.debounce_secs))?;
        let max_shift = Duration::try_hours(self.max_shift_hours)
            .with_context(|| format!("max_shift_hours is out of range: {}", self.max_shift_hours))?;

        Ok(match self.strategy {
            StrategyKind::Alternating => Box::new(Alternating),
            StrategyKind::GapAware => Box::new(GapAware {
                debounce,
                max_shift,
            }),
        })
    }

    /// The trailing window ending at `now`, with an optional months override.
    pub fn window(&self, months: Option<u32>, now: NaiveDateTime) -> Result<Window, ValidationError> {
        Window::trailing(months.unwrap_or(self.window_months), now)
    }
}

/// Returns the platform-specific config directory for att.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("att"))
}

/// Returns the platform-specific data directory for att.
///
/// On Linux: `~/.local/share/att`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("att"))
}
