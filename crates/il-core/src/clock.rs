//! Time sources for interval measurement.
//!
//! Intervals are measured on a monotonic clock so wall-clock adjustments never
//! produce negative or inflated durations. The wall clock is only used to label
//! output messages.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A pair of readings taken at the same moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// Monotonic reading used for elapsed-time arithmetic.
    pub instant: Instant,
    /// Wall-clock reading used for labeling.
    pub wall: DateTime<Utc>,
}

/// Supplies monotonic and wall-clock timestamps.
pub trait Clock {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Current wall-clock time.
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Reads both clocks.
    fn timestamp(&self) -> Timestamp {
        Timestamp {
            instant: self.now(),
            wall: self.wall_clock(),
        }
    }
}

/// The process clocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A [`ManualClock`] was asked to move further than an [`Instant`] can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("virtual time cannot reach {offset:?} past its origin")]
pub struct ClockOverflow {
    pub offset: Duration,
}

/// A clock that only moves when told to.
///
/// Clones share the same offset, so a scheduler and an engine holding clones
/// always agree on the current time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    offset: Rc<Cell<Duration>>,
}

impl ManualClock {
    /// Creates a clock anchored at the given wall-clock time.
    pub fn new(wall_origin: DateTime<Utc>) -> Self {
        Self {
            origin: Instant::now(),
            wall_origin,
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    /// Whether `offset` past the origin is representable.
    pub fn reaches(&self, offset: Duration) -> bool {
        self.origin.checked_add(offset).is_some()
    }

    /// Moves the clock forward. Moving backwards is ignored.
    pub fn advance_to(&self, offset: Duration) -> Result<(), ClockOverflow> {
        if !self.reaches(offset) {
            return Err(ClockOverflow { offset });
        }
        if offset > self.offset.get() {
            self.offset.set(offset);
        }
        Ok(())
    }

    /// Moves the clock forward by `step`.
    pub fn advance(&self, step: Duration) -> Result<(), ClockOverflow> {
        self.advance_to(self.offset.get().saturating_add(step))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        // Offsets are checked before they are stored.
        self.origin
            .checked_add(self.offset.get())
            .unwrap_or(self.origin)
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.offset.get())
            .ok()
            .and_then(|offset| self.wall_origin.checked_add_signed(offset))
            .unwrap_or(self.wall_origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::default();
        let other = clock.clone();
        let start = clock.now();

        other.advance(Duration::from_millis(250)).unwrap();

        assert_eq!(clock.now() - start, Duration::from_millis(250));
        assert_eq!(clock.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn manual_clock_never_moves_backwards() {
        let clock = ManualClock::default();
        clock.advance_to(Duration::from_secs(5)).unwrap();
        clock.advance_to(Duration::from_secs(2)).unwrap();
        assert_eq!(clock.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn manual_wall_clock_tracks_offset() {
        let origin = DateTime::parse_from_rfc3339("2025-01-29T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = ManualClock::new(origin);
        clock.advance(Duration::from_millis(1500)).unwrap();

        assert_eq!(
            clock.wall_clock().to_rfc3339(),
            "2025-01-29T12:00:01.500+00:00"
        );
    }

    #[test]
    fn manual_clock_refuses_unreachable_offsets() {
        let clock = ManualClock::default();
        clock.advance_to(Duration::from_secs(1)).unwrap();

        let err = clock.advance_to(Duration::MAX).unwrap_err();
        assert_eq!(err.offset, Duration::MAX);
        assert!(clock.advance(Duration::MAX).is_err());

        // A refused move leaves the clock where it was.
        assert_eq!(clock.elapsed(), Duration::from_secs(1));
        assert!(!clock.reaches(Duration::MAX));
    }
}
