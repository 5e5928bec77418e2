//! The interval engine.
//!
//! # Processing model
//!
//! The engine is a synchronous state machine. Inbound messages enter through
//! [`IntervalEngine::process`] and expired timers through
//! [`IntervalEngine::fire`]; the host must call both from a single serialized
//! sequence. Results leave through an [`EmissionSink`].
//!
//! For each message the engine:
//! 1. Handles a reset request by cancelling the key's timers and dropping it
//! 2. Measures the time since the key's previous message
//! 3. Emits immediately, or adds to the open window
//! 4. Opens a window if none is running and restarts the inactivity timeout

use std::time::Duration;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::clock::{Clock, Timestamp};
use crate::config::NodeConfig;
use crate::envelope::EnvelopeError;
use crate::format::format;
use crate::key::Key;
use crate::store::{KeyState, KeyStore};
use crate::timer::{FiredTimer, ScheduleError, TimerKind, TimerScheduler};

/// An inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub key: Key,
    pub reset: bool,
    pub envelope: Value,
}

impl Event {
    /// Builds an event from a raw message, reading the key and reset flag from
    /// the configured fields.
    pub fn from_envelope(envelope: Value, config: &NodeConfig) -> Self {
        let key = if config.by_key() {
            Key::from_topic(config.key_field().get(&envelope))
        } else {
            Key::shared()
        };
        let reset = config
            .reset_field()
            .get(&envelope)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Self {
            key,
            reset,
            envelope,
        }
    }
}

/// Output channel of an emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Output {
    /// Primary output: measured intervals and window results.
    Interval,
    /// Secondary output: inactivity notifications.
    Timeout,
}

/// A formatted duration handed to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Emission {
    pub key: Key,
    pub output: Output,
    /// The raw measured duration, before formatting.
    #[serde(skip)]
    pub duration: Duration,
    /// The message with the formatted duration written into it.
    pub message: Value,
}

/// Per-event failures. None of them stop processing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A result could not be written into the message; the emission was dropped.
    #[error("dropped emission for key {key}: cannot write field {field}: {source}")]
    FieldWrite {
        key: Key,
        field: String,
        #[source]
        source: EnvelopeError,
    },

    /// A timer could not be scheduled; the feature is disabled for this key.
    #[error("{timer} disabled for key {key}: {source}")]
    Schedule {
        key: Key,
        timer: TimerKind,
        #[source]
        source: ScheduleError,
    },
}

/// Receives what the engine produces.
pub trait EmissionSink {
    fn emit(&mut self, emission: Emission);
    fn diagnostic(&mut self, diagnostic: Diagnostic);
}

/// A sink that keeps everything in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub emissions: Vec<Emission>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&mut self) -> Vec<Emission> {
        std::mem::take(&mut self.emissions)
    }
}

impl EmissionSink for RecordingSink {
    fn emit(&mut self, emission: Emission) {
        self.emissions.push(emission);
    }

    fn diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// Which emission policy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmitPath {
    Immediate,
    WindowExpiry,
    Timeout,
}

/// Per-key interval measurement.
pub struct IntervalEngine<C, S> {
    config: NodeConfig,
    clock: C,
    scheduler: S,
    store: KeyStore,
    startup: Option<Timestamp>,
}

impl<C: Clock, S: TimerScheduler> IntervalEngine<C, S> {
    /// Creates an engine. The startup instant is captured here when startup
    /// seeding is enabled.
    pub fn new(config: NodeConfig, clock: C, scheduler: S) -> Self {
        let startup = config.seed_from_startup().then(|| clock.timestamp());
        Self {
            config,
            clock,
            scheduler,
            store: KeyStore::new(),
            startup,
        }
    }

    pub const fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub const fn store(&self) -> &KeyStore {
        &self.store
    }

    pub const fn clock(&self) -> &C {
        &self.clock
    }

    pub const fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub const fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Builds an [`Event`] from a raw message and processes it.
    pub fn process_envelope(&mut self, envelope: Value, sink: &mut impl EmissionSink) {
        let event = Event::from_envelope(envelope, &self.config);
        self.process(event, sink);
    }

    /// Processes one inbound message.
    pub fn process(&mut self, event: Event, sink: &mut impl EmissionSink) {
        let now = self.clock.timestamp();
        let Event {
            key,
            reset,
            envelope,
        } = event;

        if reset && self.config.reset_enabled() {
            if self.store.remove(&key, &mut self.scheduler) {
                tracing::debug!(%key, "key reset");
            } else {
                tracing::debug!(%key, "reset for unknown key ignored");
            }
            return;
        }

        let state = self.store.get_or_create(&key);
        if state.last_instant.is_none() {
            if let Some(startup) = self.startup {
                state.record(startup);
            }
        }

        if let Some(last) = state.last_instant {
            let elapsed = now.instant.saturating_duration_since(last);
            if state.window_timer.is_some() {
                state.accumulated += elapsed;
                tracing::trace!(%key, ?elapsed, accumulated = ?state.accumulated, "accumulated into window");
            } else {
                state.accumulated = elapsed;
                emit(&self.config, &key, state, EmitPath::Immediate, &envelope, sink);
            }
        }

        state.record(now);
        state.last_envelope = envelope;
        let window_disabled = state.window_disabled;
        let timeout_disabled = state.timeout_disabled;

        if let Some(window) = self.config.window() {
            if !window_disabled {
                if let Err(source) = self.store.start_window(&key, window, &mut self.scheduler) {
                    self.disable(&key, TimerKind::Window, source, sink);
                }
            }
        }

        if let Some(timeout) = self.config.timeout() {
            if !timeout_disabled {
                if let Err(source) = self.store.restart_timeout(&key, timeout, &mut self.scheduler)
                {
                    self.disable(&key, TimerKind::Timeout, source, sink);
                }
            }
        }
    }

    /// Handles an expired timer. Stale firings are ignored.
    pub fn fire(&mut self, fired: &FiredTimer, sink: &mut impl EmissionSink) {
        self.scheduler.acknowledge(fired.handle);
        let now = self.clock.timestamp();

        let Some(state) = self.store.take_fired(fired) else {
            tracing::debug!(key = %fired.key, kind = %fired.kind, handle = %fired.handle, "ignoring stale timer");
            return;
        };
        let envelope = state.last_envelope.clone();

        match fired.kind {
            TimerKind::Window => {
                emit(&self.config, &fired.key, state, EmitPath::WindowExpiry, &envelope, sink);
            }
            TimerKind::Timeout => {
                state.accumulated = state
                    .last_instant
                    .map_or(Duration::ZERO, |last| now.instant.saturating_duration_since(last));
                emit(&self.config, &fired.key, state, EmitPath::Timeout, &envelope, sink);

                if self.config.repeat_timeout() {
                    if let Some(timeout) = self.config.timeout() {
                        if let Err(source) =
                            self.store.restart_timeout(&fired.key, timeout, &mut self.scheduler)
                        {
                            self.disable(&fired.key, TimerKind::Timeout, source, sink);
                        }
                    }
                }
            }
        }
    }

    /// Cancels every outstanding timer and clears all state.
    pub fn shutdown(&mut self) {
        let keys = self.store.len();
        let cancelled = self.store.clear(&mut self.scheduler);
        tracing::info!(keys, cancelled, "interval engine shut down");
    }

    fn disable(
        &mut self,
        key: &Key,
        timer: TimerKind,
        source: ScheduleError,
        sink: &mut impl EmissionSink,
    ) {
        if let Some(state) = self.store.get_mut(key) {
            match timer {
                TimerKind::Window => state.window_disabled = true,
                TimerKind::Timeout => state.timeout_disabled = true,
            }
        }
        let diagnostic = Diagnostic::Schedule {
            key: key.clone(),
            timer,
            source,
        };
        tracing::warn!(%key, %timer, error = %diagnostic, "timer scheduling failed");
        sink.diagnostic(diagnostic);
    }
}

/// Applies the emission policy for `path` and hands the result to the sink.
fn emit(
    config: &NodeConfig,
    key: &Key,
    state: &mut KeyState,
    path: EmitPath,
    envelope: &Value,
    sink: &mut impl EmissionSink,
) {
    let value = state.accumulated;

    let allow_zero = match path {
        EmitPath::Immediate => config.emit_zero_intervals(),
        EmitPath::WindowExpiry => config.emit_on_empty_window(),
        EmitPath::Timeout => true,
    };
    if value.is_zero() && !allow_zero {
        tracing::trace!(%key, ?path, "suppressed zero duration");
        return;
    }

    if path != EmitPath::Timeout && !config.within_bounds(value) {
        tracing::debug!(%key, ?path, ?value, "duration outside configured bounds");
        return;
    }

    // The measurement is consumed whether or not the write succeeds.
    state.accumulated = Duration::ZERO;

    let mut message = envelope.clone();
    let field = config.duration_field();
    if let Err(source) = field.set(&mut message, format(value, config.output_mode())) {
        report_write_failure(key, field.as_str(), source, sink);
        return;
    }
    if let Some(field) = config.timestamp_field() {
        let label = state
            .last_wall_clock
            .map_or(Value::Null, |at| Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)));
        if let Err(source) = field.set(&mut message, label) {
            report_write_failure(key, field.as_str(), source, sink);
            return;
        }
    }

    let output = match path {
        EmitPath::Immediate | EmitPath::WindowExpiry => Output::Interval,
        EmitPath::Timeout => Output::Timeout,
    };
    sink.emit(Emission {
        key: key.clone(),
        output,
        duration: value,
        message,
    });
}

fn report_write_failure(key: &Key, field: &str, source: EnvelopeError, sink: &mut impl EmissionSink) {
    let diagnostic = Diagnostic::FieldWrite {
        key: key.clone(),
        field: field.to_string(),
        source,
    };
    tracing::warn!(%key, field, error = %diagnostic, "emission dropped");
    sink.diagnostic(diagnostic);
}
