//! Metrics Port - Relay Observability Interface
//!
//! The use cases report what happened; the adapter decides how it is
//! exported. Every method is fire-and-forget.

use std::time::Duration;

use crate::domain::error::ErrorClass;
use crate::domain::telemetry::FeedState;

/// Trait for metric sinks.
pub trait RelayMetrics: Send + Sync + 'static {
  /// One per-symbol upstream failure.
  fn record_fetch_failure(&self, pair: &str, class: ErrorClass);

  /// Attempts a retried operation took. Only attempts beyond the first count.
  fn record_retries(&self, operation: &str, attempts: u32);

  fn record_feed_state(&self, state: FeedState);

  /// A finished cycle, by outcome (`ok`, `partial`, `failed`, `fatal`, `cold_start`).
  fn record_cycle(&self, outcome: &str);

  /// Wall time of one cycle, by kind (`cycle`, `cold_start`).
  fn observe_cycle_duration(&self, kind: &str, elapsed: Duration);

  /// A tick skipped because the previous cycle was still running.
  fn record_skipped_tick(&self);
}
