//! Query API Response Types
//!
//! Serialization types for the query surface. Every successful query
//! is wrapped in the same envelope carrying a monotonic request id, the
//! request time and the feed health at the moment of the request.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::snapshot::{PairKey, Snapshot};
use crate::domain::telemetry::FeedState;

/// Request time as both an ISO-8601 string and Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStamp {
  /// RFC 3339 timestamp with millisecond precision.
  pub iso: String,
  /// Same instant in Unix ms.
  pub epoch_ms: i64,
}

impl RequestStamp {
  pub fn at(now: DateTime<Utc>) -> Self {
    Self {
      iso: now.to_rfc3339_opts(SecondsFormat::Millis, true),
      epoch_ms: now.timestamp_millis(),
    }
  }
}

/// Envelope of every successful query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse<T> {
  /// Monotonic per-process request id.
  pub request_id: u64,
  /// When the request was served.
  pub requested_at: RequestStamp,
  /// Feed health when the request was served.
  pub feed_state: FeedState,
  /// `feed_state != offline`.
  pub is_data_feed_active: bool,
  /// Query result.
  pub data: T,
}

/// Payload of the all-assets query: both generations of one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllAssetsPayload {
  /// Pair key queried.
  pub pair: PairKey,
  /// Latest reconciled snapshot.
  pub current: Snapshot,
  /// Snapshot of the cycle before.
  pub previous: Snapshot,
}

/// Error body returned with 4xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
  /// Human-readable message.
  pub error: String,
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn test_request_stamp_pairs_iso_and_epoch() {
    let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
    let stamp = RequestStamp::at(now);
    assert_eq!(stamp.iso, "2023-11-14T22:13:20.123Z");
    assert_eq!(stamp.epoch_ms, 1_700_000_000_123);
  }
}
