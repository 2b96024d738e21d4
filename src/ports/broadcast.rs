//! Broadcast Port - Push Channel Interface
//!
//! After each cycle the orchestrator tells subscribers whether fresh
//! data is available and what the feed health is. Delivery is
//! fire-and-forget: no acknowledgement, no exactly-once.

use serde::{Deserialize, Serialize};

use crate::domain::telemetry::FeedState;

/// Cycle-completion notice pushed to all subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  /// True when the cycle produced data worth re-querying.
  pub signal: bool,
  /// Feed health after the cycle.
  pub data_feed_state: FeedState,
}

/// Trait for push-channel sinks.
pub trait Notifier: Send + Sync + 'static {
  /// Forward a notification to every current subscriber.
  fn notify(&self, notification: Notification);
}
