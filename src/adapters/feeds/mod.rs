//! Market Data Feed Adapters - Upstream Ticker Sources
//!
//! Provides `TickerSource` implementations:
//! - Binance: rate-limited REST ticker source
//! - Simulated: deterministic offline source with injectable failures
//!
//! The source is picked at startup from `feed.exchange_id`.

pub mod binance;
pub mod simulated;

use std::sync::Arc;

use anyhow::Result;

pub use binance::BinanceTickerSource;
pub use simulated::SimulatedTickerSource;

use crate::config::FeedConfig;
use crate::ports::market_feed::TickerSource;

/// Build the ticker source named by `feed.exchange_id`.
///
/// # Errors
/// Unknown exchange ids and HTTP client setup failures.
pub fn build_source(config: &FeedConfig) -> Result<Arc<dyn TickerSource>> {
    match config.exchange_id.as_str() {
        binance::EXCHANGE_ID => Ok(Arc::new(BinanceTickerSource::new(
            config.base_url.clone(),
            config.timeout(),
            config.requests_per_second,
        )?)),
        simulated::EXCHANGE_ID => {
            let source = SimulatedTickerSource::new()
                .with_fail_every(config.simulated_fail_every.unwrap_or(0));
            Ok(Arc::new(source))
        }
        other => anyhow::bail!(
            "Unsupported exchange_id {other:?} (expected {:?} or {:?})",
            binance::EXCHANGE_ID,
            simulated::EXCHANGE_ID
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_config;

    fn feed(exchange_id: &str) -> FeedConfig {
        let toml = format!(
            r#"
            [service]
            name = "relay"
            [feed]
            exchange_id = "{exchange_id}"
            pairs = ["eur"]
            assets = ["BTC"]
            [cache]
            max_age = {{ minutes = 1 }}
            [scheduler]
            interval_seconds = 30
            "#
        );
        parse_config(&toml).unwrap().feed
    }

    #[test]
    fn test_builds_known_sources() {
        assert_eq!(build_source(&feed("simulated")).unwrap().name(), "simulated");
        assert_eq!(build_source(&feed("binance")).unwrap().name(), "binance");
    }

    #[test]
    fn test_rejects_unknown_exchange() {
        assert!(build_source(&feed("kraken")).is_err());
    }
}
