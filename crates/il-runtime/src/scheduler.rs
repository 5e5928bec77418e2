//! Tokio-backed timers.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use il_core::{Clock, FiredTimer, ScheduleError, TimerHandle, TimerRequest, TimerScheduler};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Reads tokio's clock, so paused test time is honoured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Schedules each timer as a sleeping task that reports back on a channel.
///
/// Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct TokioScheduler {
    fired_tx: mpsc::UnboundedSender<FiredTimer>,
    tasks: HashMap<TimerHandle, JoinHandle<()>>,
    next_id: u64,
    closed: bool,
}

impl TokioScheduler {
    pub fn new(fired_tx: mpsc::UnboundedSender<FiredTimer>) -> Self {
        Self {
            fired_tx,
            tasks: HashMap::new(),
            next_id: 0,
            closed: false,
        }
    }

    /// Timers scheduled and not yet cancelled or acknowledged.
    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }

    /// Aborts every sleeping task and refuses new timers.
    pub fn close(&mut self) {
        self.closed = true;
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

impl TimerScheduler for TokioScheduler {
    fn schedule(&mut self, request: TimerRequest) -> Result<TimerHandle, ScheduleError> {
        if self.closed || self.fired_tx.is_closed() {
            return Err(ScheduleError::ShutDown);
        }
        let deadline = tokio::time::Instant::now()
            .checked_add(request.after)
            .ok_or(ScheduleError::OutOfRange {
                after: request.after,
            })?;

        self.next_id += 1;
        let handle = TimerHandle::new(self.next_id);
        let fired = FiredTimer {
            handle,
            key: request.key,
            kind: request.kind,
        };
        let tx = self.fired_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // The engine may already be gone; nothing to deliver to then.
            let _ = tx.send(fired);
        });
        self.tasks.insert(handle, task);
        Ok(handle)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
        }
    }

    fn acknowledge(&mut self, handle: TimerHandle) {
        self.tasks.remove(&handle);
    }
}
