//! Per-key measurement state.
//!
//! Every timer transition goes through [`KeyStore`]: starting a window,
//! restarting a timeout, matching a firing against the stored handle and
//! cancelling on removal. A key's state is only dropped after its timers have
//! been cancelled.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::clock::Timestamp;
use crate::key::Key;
use crate::timer::{FiredTimer, ScheduleError, TimerHandle, TimerKind, TimerRequest, TimerScheduler};

/// Measurement state for one key.
#[derive(Debug, Clone, Default)]
pub struct KeyState {
    pub(crate) last_instant: Option<Instant>,
    pub(crate) last_wall_clock: Option<DateTime<Utc>>,
    pub(crate) accumulated: Duration,
    pub(crate) window_timer: Option<TimerHandle>,
    pub(crate) timeout_timer: Option<TimerHandle>,
    pub(crate) last_envelope: Value,
    pub(crate) window_disabled: bool,
    pub(crate) timeout_disabled: bool,
}

impl KeyState {
    /// Monotonic time of the most recent event.
    pub const fn last_instant(&self) -> Option<Instant> {
        self.last_instant
    }

    /// Wall-clock time of the most recent event.
    pub const fn last_wall_clock(&self) -> Option<DateTime<Utc>> {
        self.last_wall_clock
    }

    /// Time accumulated since the last emission.
    pub const fn accumulated(&self) -> Duration {
        self.accumulated
    }

    pub const fn window_timer(&self) -> Option<TimerHandle> {
        self.window_timer
    }

    pub const fn timeout_timer(&self) -> Option<TimerHandle> {
        self.timeout_timer
    }

    /// Whether windowing was disabled for this key after a scheduling failure.
    pub const fn window_disabled(&self) -> bool {
        self.window_disabled
    }

    /// Whether the inactivity timeout was disabled after a scheduling failure.
    pub const fn timeout_disabled(&self) -> bool {
        self.timeout_disabled
    }

    pub(crate) fn record(&mut self, at: Timestamp) {
        self.last_instant = Some(at.instant);
        self.last_wall_clock = Some(at.wall);
    }

    fn timers(&self) -> impl Iterator<Item = TimerHandle> {
        self.window_timer.into_iter().chain(self.timeout_timer)
    }
}

/// Owned mapping from key to [`KeyState`].
#[derive(Debug, Default)]
pub struct KeyStore {
    states: HashMap<Key, KeyState>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.states.contains_key(key)
    }

    pub fn get(&self, key: &Key) -> Option<&KeyState> {
        self.states.get(key)
    }

    /// Number of timers outstanding across all keys.
    pub fn outstanding_timers(&self) -> usize {
        self.states.values().map(|state| state.timers().count()).sum()
    }

    pub(crate) fn get_or_create(&mut self, key: &Key) -> &mut KeyState {
        if !self.states.contains_key(key) {
            tracing::debug!(%key, "tracking new key");
        }
        self.states.entry(key.clone()).or_default()
    }

    pub(crate) fn get_mut(&mut self, key: &Key) -> Option<&mut KeyState> {
        self.states.get_mut(key)
    }

    /// Cancels the key's timers, then forgets the key.
    ///
    /// Returns `false` if the key was not tracked.
    pub fn remove<S: TimerScheduler + ?Sized>(&mut self, key: &Key, scheduler: &mut S) -> bool {
        let Some(state) = self.states.get(key) else {
            return false;
        };
        for handle in state.timers() {
            scheduler.cancel(handle);
        }
        self.states.remove(key);
        true
    }

    /// Cancels every outstanding timer, then empties the store.
    ///
    /// Returns the number of timers cancelled.
    pub fn clear<S: TimerScheduler + ?Sized>(&mut self, scheduler: &mut S) -> usize {
        let mut cancelled = 0;
        for state in self.states.values() {
            for handle in state.timers() {
                scheduler.cancel(handle);
                cancelled += 1;
            }
        }
        self.states.clear();
        cancelled
    }

    /// Starts a window timer for `key` unless one is already running.
    ///
    /// Returns `true` when a new timer was scheduled.
    pub(crate) fn start_window<S: TimerScheduler + ?Sized>(
        &mut self,
        key: &Key,
        window: Duration,
        scheduler: &mut S,
    ) -> Result<bool, ScheduleError> {
        let state = self.get_or_create(key);
        if state.window_timer.is_some() {
            return Ok(false);
        }
        let handle = scheduler.schedule(TimerRequest {
            key: key.clone(),
            kind: TimerKind::Window,
            after: window,
        })?;
        state.window_timer = Some(handle);
        Ok(true)
    }

    /// Replaces the key's timeout timer with a fresh one.
    pub(crate) fn restart_timeout<S: TimerScheduler + ?Sized>(
        &mut self,
        key: &Key,
        timeout: Duration,
        scheduler: &mut S,
    ) -> Result<TimerHandle, ScheduleError> {
        let state = self.get_or_create(key);
        if let Some(previous) = state.timeout_timer.take() {
            scheduler.cancel(previous);
        }
        let handle = scheduler.schedule(TimerRequest {
            key: key.clone(),
            kind: TimerKind::Timeout,
            after: timeout,
        })?;
        state.timeout_timer = Some(handle);
        Ok(handle)
    }

    /// Matches a firing against the key's stored handle and clears it.
    ///
    /// Returns `None` for stale firings: the key was removed, or the timer was
    /// replaced or cancelled after it had already expired.
    pub(crate) fn take_fired(&mut self, fired: &FiredTimer) -> Option<&mut KeyState> {
        let state = self.states.get_mut(&fired.key)?;
        let slot = match fired.kind {
            TimerKind::Window => &mut state.window_timer,
            TimerKind::Timeout => &mut state.timeout_timer,
        };
        if *slot != Some(fired.handle) {
            return None;
        }
        *slot = None;
        Some(state)
    }
}
