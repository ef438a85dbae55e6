//! Attendance reconciliation CLI library.
//!
//! This crate provides the CLI interface and the export-directory event source.

mod cli;
pub mod commands;
mod config;
pub mod export;

pub use cli::{Cli, Commands, RunArgs};
pub use config::{Config, StrategyKind};
pub use export::ExportDir;
