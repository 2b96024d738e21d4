//! Acquisition Pipeline - Graded Batch Fetching
//!
//! Turns the unreliable upstream ticker capability into a graded
//! per-pair result:
//! - every configured asset is fetched sequentially
//! - soft and recoverable per-symbol failures become placeholders
//! - a fatal per-symbol failure aborts the whole batch
//! - incomplete batches are discarded unless the caller passes them through
//!
//! Whole batches are retried through `RetryPolicy` and feed health is
//! updated after every pair.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, info, instrument, warn};

use crate::domain::error::{Classify, ErrorClass, FeedError};
use crate::domain::retry::{RetryError, RetryPolicy};
use crate::domain::snapshot::{market_symbol, AssetSymbol, AssetTick, PairKey, Snapshot};
use crate::domain::telemetry::{FeedState, Telemetry};
use crate::ports::clock::Clock;
use crate::ports::market_feed::TickerSource;
use crate::ports::metrics::RelayMetrics;

/// One finished batch, before the pass-through policy is applied.
#[derive(Debug, Clone)]
struct Batch {
  snapshot: Snapshot,
  /// First per-symbol failure that retrying will not fix.
  terminal: Option<FeedError>,
}

/// Fetches per-pair batches from the upstream feed.
pub struct AcquisitionPipeline {
  /// Upstream ticker capability.
  source: Arc<dyn TickerSource>,
  /// Exchange the tickers are requested from.
  exchange_id: String,
  /// Asset symbols fetched for every pair.
  assets: Vec<AssetSymbol>,
  /// Batch-level retry policy.
  retry: RetryPolicy,
  /// Feed health, updated after every pair.
  telemetry: Arc<Telemetry>,
  /// Failure counters.
  metrics: Arc<dyn RelayMetrics>,
  /// Batch signature timestamps.
  clock: Arc<dyn Clock>,
}

impl AcquisitionPipeline {
  /// Create a new pipeline.
  pub fn new(
    source: Arc<dyn TickerSource>,
    exchange_id: impl Into<String>,
    assets: Vec<AssetSymbol>,
    retry: RetryPolicy,
    telemetry: Arc<Telemetry>,
    metrics: Arc<dyn RelayMetrics>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    Self {
      source,
      exchange_id: exchange_id.into(),
      assets,
      retry,
      telemetry,
      metrics,
      clock,
    }
  }

  pub fn assets(&self) -> &[AssetSymbol] {
    &self.assets
  }

  pub fn telemetry(&self) -> &Arc<Telemetry> {
    &self.telemetry
  }

  pub fn clock(&self) -> &Arc<dyn Clock> {
    &self.clock
  }

  /// Fetch one batch and apply the partial-result policy.
  ///
  /// Returns `Ok(None)` when the batch is incomplete and `pass_through`
  /// is false: callers that need completeness never see partial data.
  ///
  /// # Errors
  /// A fatal per-symbol failure aborts the batch.
  pub async fn fetch_one(
    &self,
    exchange_id: &str,
    pair: &str,
    symbols: &[AssetSymbol],
    pass_through: bool,
  ) -> Result<Option<Snapshot>, FeedError> {
    let batch = self.fetch_batch(exchange_id, pair, symbols).await?;
    Ok(Self::accept(batch.snapshot, pass_through))
  }

  /// `fetch_one` for the configured exchange and assets, wrapped in the
  /// retry policy. Updates feed health from the outcome.
  ///
  /// # Errors
  /// `LimitReached` when no acceptable batch arrived in time, `Abandoned`
  /// when the upstream signalled a non-retryable condition, `Fatal` on a
  /// contract violation.
  #[instrument(skip(self), fields(exchange = %self.exchange_id))]
  pub async fn fetch_with_retry(
    &self,
    pair: &str,
    pass_through: bool,
  ) -> Result<Snapshot, RetryError<FeedError>> {
    let attempts = AtomicU32::new(0);

    let result = self
      .retry
      .execute("fetch", |attempt| {
        attempts.store(attempt, Ordering::Relaxed);
        async move {
          let batch = self.fetch_batch(&self.exchange_id, pair, &self.assets).await?;
          let total = batch.snapshot.assets.len();
          let succeeded = batch.snapshot.success_count();

          match Self::accept(batch.snapshot, pass_through) {
            Some(snapshot) => Ok(snapshot),
            None => Err(batch.terminal.unwrap_or_else(|| FeedError::Incomplete {
              pair: pair.to_string(),
              succeeded,
              total,
            })),
          }
        }
      })
      .await;

    self.metrics.record_retries("fetch", attempts.load(Ordering::Relaxed));

    let state = match &result {
      Ok(snapshot) if snapshot.signature.success => FeedState::Online,
      Ok(_) => FeedState::Degraded,
      Err(_) => FeedState::Offline,
    };
    self.telemetry.set(state);

    match &result {
      Ok(snapshot) => debug!(
        pair,
        succeeded = snapshot.success_count(),
        total = snapshot.assets.len(),
        state = %state,
        "Batch accepted"
      ),
      Err(e) => warn!(pair, error = %e, "No batch accepted"),
    }

    result
  }

  /// Fetch every pair sequentially, keeping each pair's outcome.
  pub async fn fetch_all(
    &self,
    pairs: &[PairKey],
    pass_through: bool,
  ) -> Vec<(PairKey, Result<Snapshot, RetryError<FeedError>>)> {
    let mut results = Vec::with_capacity(pairs.len());
    for pair in pairs {
      let result = self.fetch_with_retry(pair, pass_through).await;
      let fatal = matches!(&result, Err(e) if e.is_fatal());
      results.push((pair.clone(), result));
      if fatal {
        break;
      }
    }
    results
  }

  /// Single-ticker connectivity check used when a valid cache is served
  /// without refetching. Sets feed health to online or offline.
  #[instrument(skip(self, pairs))]
  pub async fn check_connectivity(&self, pairs: &[PairKey]) -> FeedState {
    let (Some(pair), Some(asset)) = (pairs.first(), self.assets.first()) else {
      self.telemetry.set(FeedState::Offline);
      return FeedState::Offline;
    };

    let symbol = market_symbol(asset, pair);
    let state = match self.source.fetch_ticker(&self.exchange_id, &symbol).await {
      Ok(ticker) if ticker.success && ticker.last.is_some() => FeedState::Online,
      Ok(_) => FeedState::Offline,
      Err(e) => {
        warn!(symbol = %symbol, error = %e, "Connectivity check failed");
        FeedState::Offline
      }
    };

    self.telemetry.set(state);
    info!(symbol = %symbol, state = %state, source = self.source.name(), "Connectivity check finished");
    state
  }

  /// Fetch every symbol once, in order.
  async fn fetch_batch(
    &self,
    exchange_id: &str,
    pair: &str,
    symbols: &[AssetSymbol],
  ) -> Result<Batch, FeedError> {
    let mut ticks = Vec::with_capacity(symbols.len());
    let mut terminal = None;

    for asset in symbols {
      let symbol = market_symbol(asset, pair);

      match self.source.fetch_ticker(exchange_id, &symbol).await {
        Ok(ticker) if ticker.success && ticker.last.is_some() => {
          ticks.push(AssetTick {
            symbol: asset.clone(),
            timestamp: ticker.timestamp_ms,
            last: ticker.last,
            success: true,
          });
        }
        Ok(ticker) => {
          debug!(symbol = %symbol, "Upstream returned an unusable ticker");
          self.metrics.record_fetch_failure(pair, ErrorClass::Soft);
          ticks.push(AssetTick::placeholder(asset.clone(), ticker.timestamp_ms));
        }
        Err(e) => {
          let class = e.class();
          self.metrics.record_fetch_failure(pair, class);

          match class {
            ErrorClass::Fatal => return Err(e),
            ErrorClass::Recoverable => {
              warn!(symbol = %symbol, error = %e, "Non-retryable ticker failure");
              terminal.get_or_insert(e);
            }
            ErrorClass::Soft => {
              warn!(symbol = %symbol, error = %e, "Ticker fetch failed");
            }
          }
          ticks.push(AssetTick::placeholder(asset.clone(), self.clock.now_ms()));
        }
      }
    }

    Ok(Batch {
      snapshot: Snapshot::from_ticks(ticks, self.clock.now_ms()),
      terminal,
    })
  }

  /// Partial-result policy.
  fn accept(snapshot: Snapshot, pass_through: bool) -> Option<Snapshot> {
    (snapshot.signature.success || pass_through).then_some(snapshot)
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;
  use std::sync::Mutex;

  use async_trait::async_trait;
  use chrono::{DateTime, TimeZone, Utc};

  use super::*;
  use crate::adapters::metrics::MetricsRegistry;
  use crate::ports::market_feed::Ticker;

  struct FixedClock;

  impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
      Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }
  }

  /// Scripted source: symbols listed in `failing` fail with the given error
  /// for the first `fail_rounds` batches.
  struct ScriptedSource {
    failing: HashSet<String>,
    error: FeedError,
    fail_rounds: usize,
    calls: Mutex<Vec<String>>,
  }

  impl ScriptedSource {
    fn new(failing: &[&str], error: FeedError, fail_rounds: usize) -> Self {
      Self {
        failing: failing.iter().map(|s| s.to_string()).collect(),
        error,
        fail_rounds,
        calls: Mutex::new(Vec::new()),
      }
    }

    fn call_count(&self, symbol: &str) -> usize {
      self.calls.lock().unwrap().iter().filter(|s| *s == symbol).count()
    }
  }

  #[async_trait]
  impl TickerSource for ScriptedSource {
    async fn fetch_ticker(&self, _exchange_id: &str, symbol: &str) -> Result<Ticker, FeedError> {
      let round = {
        let mut calls = self.calls.lock().unwrap();
        calls.push(symbol.to_string());
        calls.iter().filter(|s| *s == symbol).count()
      };
      if self.failing.contains(symbol) && round <= self.fail_rounds {
        return Err(self.error.clone());
      }
      Ok(Ticker {
        symbol: symbol.to_string(),
        timestamp_ms: 1_700_000_000_000,
        last: Some(100.0),
        success: true,
      })
    }

    fn name(&self) -> &'static str {
      "scripted"
    }
  }

  fn assets(n: usize) -> Vec<AssetSymbol> {
    (0..n).map(|i| format!("A{i}")).collect()
  }

  fn pipeline(source: Arc<ScriptedSource>, n_assets: usize, limit: u32) -> (AcquisitionPipeline, Arc<Telemetry>) {
    let telemetry = Arc::new(Telemetry::default());
    let pipeline = AcquisitionPipeline::new(
      source,
      "test",
      assets(n_assets),
      RetryPolicy::new(limit),
      Arc::clone(&telemetry),
      Arc::new(MetricsRegistry::new().unwrap()),
      Arc::new(FixedClock),
    );
    (pipeline, telemetry)
  }

  #[tokio::test]
  async fn test_partial_batch_suppressed_without_pass_through() {
    let source = Arc::new(ScriptedSource::new(&["A9/EUR"], FeedError::Timeout, usize::MAX));
    let (p, _) = pipeline(source, 10, 1);

    let result = p.fetch_one("test", "eur", &assets(10), false).await.unwrap();
    assert!(result.is_none());
  }

  #[tokio::test]
  async fn test_partial_batch_passed_through() {
    let source = Arc::new(ScriptedSource::new(&["A9/EUR"], FeedError::Timeout, usize::MAX));
    let (p, _) = pipeline(source, 10, 1);

    let snapshot = p.fetch_one("test", "eur", &assets(10), true).await.unwrap().unwrap();
    assert!(!snapshot.signature.success);
    assert_eq!(snapshot.success_count(), 9);
    assert!(snapshot.asset("A9").unwrap().last.is_none());
  }

  #[tokio::test]
  async fn test_fatal_symbol_aborts_batch() {
    let source = Arc::new(ScriptedSource::new(
      &["A1/EUR"],
      FeedError::Contract("bad symbol format".into()),
      usize::MAX,
    ));
    let (p, _) = pipeline(Arc::clone(&source), 3, 1);

    let result = p.fetch_one("test", "eur", &assets(3), true).await;
    assert!(matches!(result, Err(FeedError::Contract(_))));
    assert_eq!(source.call_count("A2/EUR"), 0);
  }

  #[tokio::test]
  async fn test_retry_recovers_and_goes_online() {
    let source = Arc::new(ScriptedSource::new(&["A0/EUR"], FeedError::RateLimited, 2));
    let (p, telemetry) = pipeline(Arc::clone(&source), 2, 5);

    let snapshot = p.fetch_with_retry("eur", false).await.unwrap();
    assert!(snapshot.signature.success);
    assert_eq!(source.call_count("A0/EUR"), 3);
    assert_eq!(telemetry.state(), FeedState::Online);
  }

  #[tokio::test]
  async fn test_accepted_partial_is_degraded() {
    let source = Arc::new(ScriptedSource::new(&["A0/EUR"], FeedError::Timeout, usize::MAX));
    let (p, telemetry) = pipeline(source, 2, 3);

    let snapshot = p.fetch_with_retry("eur", true).await.unwrap();
    assert!(!snapshot.signature.success);
    assert_eq!(telemetry.state(), FeedState::Degraded);
  }

  #[tokio::test]
  async fn test_exhausted_retries_go_offline() {
    let source = Arc::new(ScriptedSource::new(&["A0/EUR"], FeedError::Timeout, usize::MAX));
    let (p, telemetry) = pipeline(Arc::clone(&source), 2, 3);
    telemetry.set(FeedState::Online);

    let err = p.fetch_with_retry("eur", false).await.unwrap_err();
    assert!(matches!(err, RetryError::LimitReached { attempts: 3, .. }));
    assert_eq!(source.call_count("A0/EUR"), 3);
    assert_eq!(telemetry.state(), FeedState::Offline);
  }

  #[tokio::test]
  async fn test_not_found_symbol_stops_retrying() {
    let source = Arc::new(ScriptedSource::new(
      &["A1/EUR"],
      FeedError::NotFound("A1/EUR".into()),
      usize::MAX,
    ));
    let (p, _) = pipeline(Arc::clone(&source), 2, 5);

    let err = p.fetch_with_retry("eur", false).await.unwrap_err();
    assert!(matches!(err, RetryError::Abandoned { attempts: 1, .. }));
    assert_eq!(source.call_count("A1/EUR"), 1);
  }

  #[tokio::test]
  async fn test_connectivity_check_sets_online() {
    let source = Arc::new(ScriptedSource::new(&[], FeedError::Timeout, 0));
    let (p, telemetry) = pipeline(source, 1, 1);

    assert_eq!(p.check_connectivity(&["eur".to_string()]).await, FeedState::Online);
    assert!(telemetry.is_data_feed_active());
  }

  #[tokio::test]
  async fn test_connectivity_check_failure_sets_offline() {
    let source = Arc::new(ScriptedSource::new(&["A0/EUR"], FeedError::Timeout, usize::MAX));
    let (p, telemetry) = pipeline(source, 1, 1);
    telemetry.set(FeedState::Online);

    assert_eq!(p.check_connectivity(&["eur".to_string()]).await, FeedState::Offline);
    assert!(!telemetry.is_data_feed_active());
  }
}
