//! Deterministic virtual time.
//!
//! [`VirtualScheduler`] keeps pending timers in deadline order against a
//! [`ManualClock`]; [`Simulation`] wires both into an [`IntervalEngine`] and
//! fires due timers as time is advanced. Used for replaying recorded message
//! streams and for testing timing behaviour without sleeping.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::clock::{ClockOverflow, ManualClock};
use crate::config::NodeConfig;
use crate::engine::{EmissionSink, IntervalEngine};
use crate::timer::{FiredTimer, ScheduleError, TimerHandle, TimerRequest, TimerScheduler};

type Slot = (Duration, u64);

/// Timer scheduler driven by a [`ManualClock`].
///
/// Timers with equal deadlines fire in the order they were scheduled.
#[derive(Debug)]
pub struct VirtualScheduler {
    clock: ManualClock,
    next_id: u64,
    pending: BTreeMap<Slot, FiredTimer>,
    slots: HashMap<TimerHandle, Slot>,
    closed: bool,
}

impl VirtualScheduler {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            next_id: 0,
            pending: BTreeMap::new(),
            slots: HashMap::new(),
            closed: false,
        }
    }

    /// Number of timers waiting to fire.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Deadline of the earliest pending timer, as an offset from clock origin.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Removes the earliest timer due at or before `until`.
    pub fn pop_due(&mut self, until: Duration) -> Option<(Duration, FiredTimer)> {
        let (&slot, _) = self.pending.first_key_value()?;
        if slot.0 > until {
            return None;
        }
        let fired = self.pending.remove(&slot)?;
        self.slots.remove(&fired.handle);
        Some((slot.0, fired))
    }

    /// Refuses further timers and drops pending ones.
    pub fn close(&mut self) {
        self.closed = true;
        self.pending.clear();
        self.slots.clear();
    }
}

impl TimerScheduler for VirtualScheduler {
    fn schedule(&mut self, request: TimerRequest) -> Result<TimerHandle, ScheduleError> {
        if self.closed {
            return Err(ScheduleError::ShutDown);
        }
        let deadline = self
            .clock
            .elapsed()
            .checked_add(request.after)
            .filter(|deadline| self.clock.reaches(*deadline))
            .ok_or(ScheduleError::OutOfRange {
                after: request.after,
            })?;

        self.next_id += 1;
        let handle = TimerHandle::new(self.next_id);
        let slot = (deadline, self.next_id);
        self.pending.insert(
            slot,
            FiredTimer {
                handle,
                key: request.key,
                kind: request.kind,
            },
        );
        self.slots.insert(handle, slot);
        Ok(handle)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(slot) = self.slots.remove(&handle) {
            self.pending.remove(&slot);
        }
    }
}

/// An [`IntervalEngine`] running in virtual time.
pub struct Simulation {
    clock: ManualClock,
    engine: IntervalEngine<ManualClock, VirtualScheduler>,
}

impl Simulation {
    /// Starts a simulation at offset zero with the wall clock at the Unix epoch.
    pub fn new(config: NodeConfig) -> Self {
        Self::with_wall_origin(config, DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Starts a simulation whose offset zero corresponds to `origin`.
    pub fn with_wall_origin(config: NodeConfig, origin: DateTime<Utc>) -> Self {
        let clock = ManualClock::new(origin);
        let scheduler = VirtualScheduler::new(clock.clone());
        let engine = IntervalEngine::new(config, clock.clone(), scheduler);
        Self { clock, engine }
    }

    /// Current offset from the simulation start.
    pub fn now(&self) -> Duration {
        self.clock.elapsed()
    }

    pub const fn engine(&self) -> &IntervalEngine<ManualClock, VirtualScheduler> {
        &self.engine
    }

    /// Moves time forward to `at`, firing every timer that falls due on the way.
    ///
    /// Fails without moving or firing anything when `at` is beyond what the
    /// clock can represent.
    pub fn advance_to(
        &mut self,
        at: Duration,
        sink: &mut impl EmissionSink,
    ) -> Result<(), ClockOverflow> {
        if !self.clock.reaches(at) {
            return Err(ClockOverflow { offset: at });
        }
        while let Some((deadline, fired)) = self.engine.scheduler_mut().pop_due(at) {
            self.clock.advance_to(deadline)?;
            self.engine.fire(&fired, sink);
        }
        self.clock.advance_to(at)
    }

    /// Delivers a raw message at the current time.
    pub fn send(&mut self, envelope: Value, sink: &mut impl EmissionSink) {
        self.engine.process_envelope(envelope, sink);
    }

    /// Advances to `at`, then delivers a raw message.
    pub fn send_at(
        &mut self,
        at: Duration,
        envelope: Value,
        sink: &mut impl EmissionSink,
    ) -> Result<(), ClockOverflow> {
        self.advance_to(at, sink)?;
        self.send(envelope, sink);
        Ok(())
    }

    /// Cancels all timers and stops accepting new ones.
    pub fn shutdown(&mut self) {
        self.engine.shutdown();
        self.engine.scheduler_mut().close();
    }
}
