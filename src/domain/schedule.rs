//! Minute-aligned tick computation and scheduler bookkeeping.
//!
//! Ticks land on `interval_seconds` past the minute. When the clock sits
//! exactly on the pivot second the next tick is a full minute away so the
//! same slot is never fired twice.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const SECONDS_PER_MINUTE: u32 = 60;

/// Seconds until the next aligned tick.
///
/// `seconds_in_minute` is the wall-clock second within the current minute.
pub fn alignment_gap(seconds_in_minute: u32, interval_seconds: u32) -> u32 {
    let s = seconds_in_minute % SECONDS_PER_MINUTE;

    if s == 0 {
        interval_seconds
    } else if s == interval_seconds {
        SECONDS_PER_MINUTE
    } else if s <= interval_seconds {
        interval_seconds - s
    } else {
        (SECONDS_PER_MINUTE - s) + interval_seconds
    }
}

/// Full delay before the next tick, including the skip offset.
///
/// The skip offset only applies after the first run.
pub fn next_delay(seconds_in_minute: u32, interval_seconds: u32, skip_minutes: u32, first_run: bool) -> Duration {
    let skip = if first_run { 0 } else { u64::from(skip_minutes) };
    let gap = u64::from(alignment_gap(seconds_in_minute, interval_seconds));

    Duration::from_millis(gap * 1_000 + skip * 60 * 1_000)
}

/// Lifecycle phase of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Armed,
    Running,
}

/// Overlap guard shared between the scheduler and the running cycle.
#[derive(Debug, Clone, Default)]
pub struct RequestGate {
    active: Arc<AtomicBool>,
}

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Mark a cycle as running. Returns `None` if one already is.
    ///
    /// The flag is cleared when the returned guard drops, including
    /// on early return and unwinding.
    pub fn try_acquire(&self) -> Option<ActiveGuard> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ActiveGuard {
                active: Arc::clone(&self.active),
            })
    }
}

/// Clears the request flag on drop.
#[derive(Debug)]
pub struct ActiveGuard {
    active: Arc<AtomicBool>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// State owned by the scheduler loop.
#[derive(Debug, Clone)]
pub struct SchedulerState {
    /// Ticks fired so far (including skipped ones).
    pub counter: u64,
    /// True until the first arm.
    pub is_first_run: bool,
    /// A tick is pending.
    pub armed: bool,
    /// Overlap guard.
    pub gate: RequestGate,
}

impl SchedulerState {
    pub fn new(gate: RequestGate) -> Self {
        Self {
            counter: 0,
            is_first_run: true,
            armed: false,
            gate,
        }
    }

    pub fn is_request_active(&self) -> bool {
        self.gate.is_active()
    }

    /// Current phase, read from the gate so a finished cycle is never
    /// reported as running.
    pub fn phase(&self) -> SchedulerPhase {
        if self.gate.is_active() {
            SchedulerPhase::Running
        } else if self.armed {
            SchedulerPhase::Armed
        } else {
            SchedulerPhase::Idle
        }
    }
}
