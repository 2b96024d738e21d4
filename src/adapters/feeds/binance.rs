//! Binance REST Feed - Primary Ticker Source
//!
//! Fetches the 24h rolling ticker for one symbol per request from the
//! Binance spot REST API. Requests are throttled client-side with a
//! token bucket so a full batch never trips the exchange weight limit.
//!
//! Failures are classified for the retry executor:
//! - 429/418, 5xx, connect errors, timeouts → soft
//! - unknown symbol, unparsable body → recoverable
//! - a request for another exchange → fatal

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::domain::error::FeedError;
use crate::ports::market_feed::{Ticker, TickerSource};

/// Exchange id this adapter answers for.
pub const EXCHANGE_ID: &str = "binance";

/// Binance error code for an unknown symbol.
const INVALID_SYMBOL: i64 = -1121;

/// `GET /api/v3/ticker/24hr` response (fields we use).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: String,
    /// Last price as a decimal string.
    last_price: String,
    /// Window close time (Unix ms).
    close_time: i64,
}

/// Binance error body.
#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

/// Rate-limited Binance REST ticker source.
pub struct BinanceTickerSource {
    /// Underlying HTTP client.
    http: Client,
    /// REST base URL.
    base_url: String,
    /// Client-side request budget.
    limiter: DefaultDirectRateLimiter,
}

impl BinanceTickerSource {
    /// Create a new source.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built or the request budget is zero.
    pub fn new(base_url: impl Into<String>, timeout: Duration, requests_per_second: u32) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(2)
            .build()
            .context("Failed to build HTTP client")?;

        let rps = NonZeroU32::new(requests_per_second).context("requests_per_second must be > 0")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            limiter: RateLimiter::direct(Quota::per_second(rps)),
        })
    }

    /// `BTC/EUR` → `BTCEUR`.
    pub fn exchange_symbol(symbol: &str) -> String {
        symbol.replace('/', "").to_uppercase()
    }

    fn classify_transport(e: &reqwest::Error) -> FeedError {
        if e.is_timeout() {
            FeedError::Timeout
        } else if e.is_decode() {
            FeedError::Malformed(e.to_string())
        } else {
            FeedError::Unavailable(e.to_string())
        }
    }

    fn classify_status(status: StatusCode, symbol: &str, body: &str) -> FeedError {
        match status {
            StatusCode::TOO_MANY_REQUESTS | StatusCode::IM_A_TEAPOT => FeedError::RateLimited,
            StatusCode::NOT_FOUND => FeedError::NotFound(symbol.to_string()),
            StatusCode::BAD_REQUEST => match serde_json::from_str::<ApiError>(body) {
                Ok(err) if err.code == INVALID_SYMBOL => FeedError::NotFound(symbol.to_string()),
                Ok(err) => FeedError::Malformed(format!("code {}: {}", err.code, err.msg)),
                Err(_) => FeedError::Malformed(format!("HTTP 400: {body}")),
            },
            s if s.is_server_error() => FeedError::Unavailable(format!("HTTP {s}")),
            s => FeedError::Malformed(format!("unexpected HTTP {s}")),
        }
    }

    fn parse_ticker(symbol: &str, body: &str) -> Result<Ticker, FeedError> {
        let raw: Ticker24h =
            serde_json::from_str(body).map_err(|e| FeedError::Malformed(e.to_string()))?;

        let last = raw
            .last_price
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite() && *p > 0.0);

        debug!(symbol = %raw.symbol, last = ?last, "Binance ticker received");

        Ok(Ticker {
            symbol: symbol.to_string(),
            timestamp_ms: raw.close_time,
            last,
            success: last.is_some(),
        })
    }
}

#[async_trait]
impl TickerSource for BinanceTickerSource {
    #[instrument(skip(self), level = "debug")]
    async fn fetch_ticker(&self, exchange_id: &str, symbol: &str) -> Result<Ticker, FeedError> {
        if exchange_id != EXCHANGE_ID {
            return Err(FeedError::Contract(format!(
                "binance source asked for exchange {exchange_id}"
            )));
        }
        if !symbol.contains('/') {
            return Err(FeedError::Contract(format!("symbol {symbol} is not BASE/QUOTE")));
        }

        self.limiter.until_ready().await;

        let url = format!("{}/api/v3/ticker/24hr", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("symbol", Self::exchange_symbol(symbol))])
            .send()
            .await
            .map_err(|e| Self::classify_transport(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Self::classify_transport(&e))?;

        if !status.is_success() {
            return Err(Self::classify_status(status, symbol, &body));
        }

        Self::parse_ticker(symbol, &body)
    }

    fn name(&self) -> &'static str {
        EXCHANGE_ID
    }
}
