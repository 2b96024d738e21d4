//! Market Feed Port - Upstream Ticker Interface
//!
//! Defines the capability the acquisition pipeline needs from an
//! exchange: fetch the latest ticker for one symbol.

use async_trait::async_trait;

use crate::domain::error::FeedError;

/// Latest ticker for one market symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
  /// Market symbol as requested (e.g. `BTC/EUR`).
  pub symbol: String,
  /// Ticker timestamp (Unix ms).
  pub timestamp_ms: i64,
  /// Last traded price.
  pub last: Option<f64>,
  /// Whether the upstream considered the ticker valid.
  pub success: bool,
}

/// Trait for upstream ticker providers.
///
/// Implementors perform exactly one upstream request per call and
/// classify failures through `FeedError`: soft errors may be retried,
/// `NotFound`/`Malformed` must not be, `Contract` aborts the batch.
#[async_trait]
pub trait TickerSource: Send + Sync + 'static {
  /// Fetch the latest ticker for `symbol` on `exchange_id`.
  async fn fetch_ticker(&self, exchange_id: &str, symbol: &str) -> Result<Ticker, FeedError>;

  /// Source name for logs and metrics.
  fn name(&self) -> &'static str;
}
