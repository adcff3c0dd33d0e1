//! Manually driven scheduler.
//!
//! Time only moves when the test says so. Timers are kept in a table and
//! fired one at a time in deadline order (ties in scheduling order), which
//! makes every interleaving explicit.

use std::collections::BTreeMap;
use std::time::Duration;
use streaming_app::runtime::{Scheduler, SimTime, TimerHandle, TimerKind, Transport};
use streaming_app::session::StreamingSession;

/// A pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub handle: TimerHandle,
    pub at: SimTime,
    pub kind: TimerKind,
}

/// Scheduler whose clock and timers are driven by the test.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: SimTime,
    next_handle: u64,
    timers: BTreeMap<TimerHandle, (SimTime, TimerKind)>,
    cancelled: u32,
}

impl ManualScheduler {
    /// Scheduler at time zero with no timers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler starting at `now`.
    #[must_use]
    pub fn at(now: SimTime) -> Self {
        Self {
            now,
            ..Self::default()
        }
    }

    /// Jump the clock to `now`. Timers are not fired.
    pub fn set_now(&mut self, now: SimTime) {
        self.now = now;
    }

    /// Move the clock forward by `by`. Timers are not fired.
    pub fn advance(&mut self, by: Duration) {
        self.now = self.now + by;
    }

    /// All pending timers, earliest first.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingTimer> {
        let mut pending: Vec<PendingTimer> = self
            .timers
            .iter()
            .map(|(&handle, &(at, kind))| PendingTimer { handle, at, kind })
            .collect();
        pending.sort_by_key(|t| (t.at, t.handle));
        pending
    }

    /// The pending timer of `kind`, if any.
    #[must_use]
    pub fn pending_of(&self, kind: TimerKind) -> Option<PendingTimer> {
        self.pending().into_iter().find(|t| t.kind == kind)
    }

    /// Number of `cancel` calls that removed a pending timer.
    #[must_use]
    pub fn cancelled(&self) -> u32 {
        self.cancelled
    }

    /// Fire the earliest pending timer, advancing the clock to its deadline.
    ///
    /// Returns the fired timer, or `None` if nothing is pending.
    pub fn fire_next<T: Transport>(
        &mut self,
        session: &mut StreamingSession<T>,
    ) -> Option<PendingTimer> {
        let next = self.pending().into_iter().next()?;
        self.timers.remove(&next.handle);
        if next.at > self.now {
            self.now = next.at;
        }
        session.handle_timer(next.kind, next.handle, self);
        Some(next)
    }

    /// Fire every timer due at or before `end`, then set the clock to `end`.
    ///
    /// Returns the fired timers in order.
    pub fn run_until<T: Transport>(
        &mut self,
        session: &mut StreamingSession<T>,
        end: SimTime,
    ) -> Vec<PendingTimer> {
        let mut fired = Vec::new();
        while let Some(next) = self.pending().into_iter().next() {
            if next.at > end {
                break;
            }
            if let Some(timer) = self.fire_next(session) {
                fired.push(timer);
            }
        }
        if self.now < end {
            self.now = end;
        }
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule_after(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.timers.insert(handle, (self.now + delay, kind));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if self.timers.remove(&handle).is_some() {
            self.cancelled += 1;
        }
    }
}
