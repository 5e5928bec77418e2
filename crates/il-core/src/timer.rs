//! Timer scheduling seam.
//!
//! The engine never owns ambient timers. It asks a [`TimerScheduler`] for a
//! one-shot timer and gets back a [`TimerHandle`]; when the timer expires the
//! host feeds a [`FiredTimer`] back into the engine's serialized processing
//! sequence. Handles are unique for the lifetime of a scheduler, so a firing
//! whose handle no longer matches the key's stored handle is stale.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::Key;

/// The two per-key timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Closes an accumulation window.
    Window,
    /// Signals inactivity on a key.
    Timeout,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Window => write!(f, "window"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Identifies one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// A timer the engine wants scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerRequest {
    pub key: Key,
    pub kind: TimerKind,
    pub after: Duration,
}

/// A timer that expired and must be handed back to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTimer {
    pub handle: TimerHandle,
    pub key: Key,
    pub kind: TimerKind,
}

/// Scheduling errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The scheduler no longer accepts timers.
    #[error("timer scheduler is shut down")]
    ShutDown,

    /// The delay cannot be represented by the timer facility.
    #[error("timer delay {after:?} is out of range")]
    OutOfRange { after: Duration },
}

/// Host timer facility.
pub trait TimerScheduler {
    /// Schedules a one-shot timer.
    fn schedule(&mut self, request: TimerRequest) -> Result<TimerHandle, ScheduleError>;

    /// Cancels a timer. Unknown or already-fired handles are ignored.
    fn cancel(&mut self, handle: TimerHandle);

    /// Called when the engine receives a firing, so the scheduler can release
    /// whatever it kept for that timer.
    fn acknowledge(&mut self, handle: TimerHandle) {
        let _ = handle;
    }
}
