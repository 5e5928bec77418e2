//! Core logic for interval length measurement.
//!
//! This crate contains:
//! - Engine: per-key elapsed time, windowed accumulation, inactivity timeouts
//! - Store: per-key state and every timer transition
//! - Formatting: milliseconds, human-readable text, unit breakdowns
//! - Simulation: virtual time for replays and deterministic tests
//!
//! Hosts supply a [`Clock`], a [`TimerScheduler`] and an [`EmissionSink`].

pub mod clock;
pub mod config;
mod engine;
pub mod envelope;
pub mod format;
mod key;
pub mod simulation;
mod store;
pub mod timer;

pub use clock::{Clock, ClockOverflow, ManualClock, SystemClock, Timestamp};
pub use config::{ConfigError, NodeConfig, NodeSettings, TimeUnit};
pub use engine::{Diagnostic, Emission, EmissionSink, Event, IntervalEngine, Output, RecordingSink};
pub use envelope::{EnvelopeError, FieldPath};
pub use format::{Breakdown, FormatError, OutputMode, format, format_millis, humanize};
pub use key::{Key, SHARED_KEY};
pub use simulation::{Simulation, VirtualScheduler};
pub use store::{KeyState, KeyStore};
pub use timer::{FiredTimer, ScheduleError, TimerHandle, TimerKind, TimerRequest, TimerScheduler};
