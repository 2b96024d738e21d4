//! Broadcast Gateway - Push and Query Glue
//!
//! Fans cycle notifications out to every push subscriber and answers
//! queries from the shared state store. Queries always return the best
//! available snapshot together with the current feed health; only an
//! unknown pair or asset is an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::debug;

use super::types::{AllAssetsPayload, QueryResponse, RequestStamp};
use crate::domain::error::QueryError;
use crate::domain::snapshot::{AssetTick, Generation};
use crate::domain::state::SharedState;
use crate::domain::telemetry::{FeedState, Telemetry};
use crate::ports::broadcast::{Notification, Notifier};
use crate::ports::clock::Clock;

/// Default capacity of the push channel; slower subscribers lag and skip.
pub const PUSH_CAPACITY: usize = 64;

/// Push fan-out plus query handlers over the shared store.
pub struct Gateway {
  /// Reconciled state (read-only here).
  state: SharedState,
  /// Feed health.
  telemetry: Arc<Telemetry>,
  /// Request timestamps.
  clock: Arc<dyn Clock>,
  /// Push channel.
  tx: broadcast::Sender<Notification>,
  /// Last issued request id.
  last_request_id: AtomicU64,
}

impl Gateway {
  /// Create a new gateway.
  pub fn new(
    state: SharedState,
    telemetry: Arc<Telemetry>,
    clock: Arc<dyn Clock>,
    capacity: usize,
  ) -> Self {
    let (tx, _) = broadcast::channel(capacity.max(1));
    Self {
      state,
      telemetry,
      clock,
      tx,
      last_request_id: AtomicU64::new(0),
    }
  }

  /// Register a push subscriber.
  pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
    self.tx.subscribe()
  }

  pub fn subscriber_count(&self) -> usize {
    self.tx.receiver_count()
  }

  pub fn feed_state(&self) -> FeedState {
    self.telemetry.state()
  }

  /// Both generations of one pair.
  ///
  /// # Errors
  /// `PairNotFound` for a pair outside the configured set.
  pub async fn get_all_assets(
    &self,
    pair: &str,
  ) -> Result<QueryResponse<AllAssetsPayload>, QueryError> {
    let payload = {
      let store = self.state.read().await;
      let current = store.snapshot(Generation::Current, pair);
      let previous = store.snapshot(Generation::Previous, pair);
      match (current, previous) {
        (Some(current), Some(previous)) => AllAssetsPayload {
          pair: pair.to_string(),
          current: current.clone(),
          previous: previous.clone(),
        },
        _ => return Err(QueryError::PairNotFound(pair.to_string())),
      }
    };
    Ok(self.envelope(payload))
  }

  /// Current tick of one asset in one pair.
  ///
  /// # Errors
  /// `PairNotFound` or `AssetNotFound` when the key is absent.
  pub async fn get_single_asset(
    &self,
    pair: &str,
    symbol: &str,
  ) -> Result<QueryResponse<AssetTick>, QueryError> {
    let tick = {
      let store = self.state.read().await;
      let snapshot = store
        .snapshot(Generation::Current, pair)
        .ok_or_else(|| QueryError::PairNotFound(pair.to_string()))?;
      snapshot
        .asset(symbol)
        .cloned()
        .ok_or_else(|| QueryError::AssetNotFound {
          pair: pair.to_string(),
          symbol: symbol.to_string(),
        })?
    };
    Ok(self.envelope(tick))
  }

  fn envelope<T>(&self, data: T) -> QueryResponse<T> {
    let feed_state = self.telemetry.state();
    QueryResponse {
      request_id: self.last_request_id.fetch_add(1, Ordering::Relaxed) + 1,
      requested_at: RequestStamp::at(self.clock.now()),
      feed_state,
      is_data_feed_active: feed_state.is_active(),
      data,
    }
  }
}

impl Notifier for Gateway {
  fn notify(&self, notification: Notification) {
    match self.tx.send(notification) {
      Ok(subscribers) => debug!(
        subscribers,
        signal = notification.signal,
        state = %notification.data_feed_state,
        "Notification pushed"
      ),
      Err(_) => debug!("Notification dropped, no subscribers"),
    }
  }
}
