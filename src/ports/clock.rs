//! Clock Port - Wall-Clock Time
//!
//! Scheduling alignment and cache age depend on wall-clock time; tests
//! substitute a fixed clock.

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync + 'static {
  fn now(&self) -> DateTime<Utc>;

  /// Current time in Unix milliseconds.
  fn now_ms(&self) -> i64 {
    self.now().timestamp_millis()
  }
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}
