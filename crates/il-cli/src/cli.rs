//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use il_core::OutputMode;

/// Interval length measurement.
///
/// Measures the time between successive messages per topic, optionally
/// summing over windows and notifying when a topic goes quiet.
#[derive(Debug, Parser)]
#[command(name = "interval-length", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Measure JSON-lines messages from stdin in real time.
    Run,

    /// Replay timestamped JSON-lines records in virtual time.
    ///
    /// Each line is `{"at_ms": <offset>, "message": {...}}` with
    /// non-decreasing offsets.
    Replay {
        /// Read records from this file instead of stdin.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Keep timers running until this offset (milliseconds) before stopping.
        #[arg(long)]
        until: Option<f64>,

        /// Wall-clock time of offset zero (RFC 3339). Defaults to now.
        #[arg(long)]
        origin: Option<DateTime<Utc>>,
    },

    /// Format a duration given in milliseconds.
    Format {
        /// Duration in milliseconds.
        millis: f64,

        /// Output mode (milliseconds, human, breakdown). Defaults to the
        /// configured mode.
        #[arg(long)]
        mode: Option<OutputMode>,
    },

    /// Validate the configuration and print the effective settings.
    Check,
}
