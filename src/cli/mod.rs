//! Command-line interface for kanjigen.
//!
//! Provides commands for batch generation, single-item generation, progress
//! inspection, and dataset export.

mod commands;

pub use commands::{parse_cli, run_with_cli};
