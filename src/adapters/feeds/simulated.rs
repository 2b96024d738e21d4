//! Simulated Feed - Deterministic Offline Ticker Source
//!
//! Produces stable, symbol-derived prices without network access so the
//! relay can run in development and demos. Failures can be injected:
//! every Nth request fails softly, and individual symbols can be forced
//! to fail with any `FeedError`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::domain::error::FeedError;
use crate::ports::market_feed::{Ticker, TickerSource};

/// Exchange id this adapter answers for.
pub const EXCHANGE_ID: &str = "simulated";

/// Offline ticker source with injectable failures.
#[derive(Debug, Default)]
pub struct SimulatedTickerSource {
    /// Requests served so far, failed ones included.
    requests: AtomicU64,
    /// Every Nth request fails with `Simulated`.
    fail_every: Option<u64>,
    /// Symbols that always fail with the stored error.
    forced: RwLock<HashMap<String, FeedError>>,
}

impl SimulatedTickerSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `n`th request fail softly. `0` disables injection.
    #[must_use]
    pub fn with_fail_every(mut self, n: u32) -> Self {
        self.fail_every = (n > 0).then_some(u64::from(n));
        self
    }

    /// Force `symbol` to fail with `error` until cleared.
    pub fn fail_symbol(&self, symbol: impl Into<String>, error: FeedError) {
        if let Ok(mut forced) = self.forced.write() {
            forced.insert(symbol.into(), error);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut forced) = self.forced.write() {
            forced.clear();
        }
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Stable base price derived from the symbol, drifting slightly per request.
    fn price_for(symbol: &str, request: u64) -> f64 {
        let seed = symbol
            .bytes()
            .fold(17u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
        let base = 10.0 + (seed % 90_000) as f64;
        let drift = ((request % 21) as f64 - 10.0) / 1_000.0;
        base * (1.0 + drift)
    }
}

#[async_trait]
impl TickerSource for SimulatedTickerSource {
    async fn fetch_ticker(&self, exchange_id: &str, symbol: &str) -> Result<Ticker, FeedError> {
        if exchange_id != EXCHANGE_ID {
            return Err(FeedError::Contract(format!(
                "simulated source asked for exchange {exchange_id}"
            )));
        }

        let request = self.requests.fetch_add(1, Ordering::Relaxed) + 1;

        let forced = self
            .forced
            .read()
            .ok()
            .and_then(|forced| forced.get(symbol).cloned());
        if let Some(error) = forced {
            return Err(error);
        }

        if self.fail_every.is_some_and(|n| request % n == 0) {
            debug!(symbol, request, "Injecting simulated failure");
            return Err(FeedError::Simulated(format!("request {request}")));
        }

        Ok(Ticker {
            symbol: symbol.to_string(),
            timestamp_ms: Utc::now().timestamp_millis(),
            last: Some(Self::price_for(symbol, request)),
            success: true,
        })
    }

    fn name(&self) -> &'static str {
        EXCHANGE_ID
    }
}
