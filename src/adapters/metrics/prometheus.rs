//! Prometheus Metrics Registry - Feed Observability
//!
//! Registers the relay's metrics on a private registry and renders
//! them in the text exposition format. All metrics follow the
//! naming convention `price_relay_*`.

use std::time::Duration;

use prometheus::{
    Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

use crate::domain::error::ErrorClass;
use crate::domain::telemetry::FeedState;
use crate::ports::metrics::RelayMetrics;

/// Centralized Prometheus metrics for the relay.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Cycles by outcome (`ok`, `failed`, `cold_start`).
    pub cycles: IntCounterVec,
    /// Per-symbol upstream failures by pair and error class.
    pub fetch_failures: IntCounterVec,
    /// Retry attempts beyond the first, by operation.
    pub retries: IntCounterVec,
    /// Feed state (2 = online, 1 = degraded, 0 = offline).
    pub feed_state: Gauge,
    /// Cycle duration histogram (seconds).
    pub cycle_duration: HistogramVec,
    /// Ticks skipped because the previous cycle was still running.
    pub skipped_ticks: IntCounter,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    ///
    /// # Errors
    /// Fails only if two metrics share a name.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cycles = IntCounterVec::new(
            Opts::new("price_relay_cycles_total", "Completed cycles by outcome"),
            &["outcome"],
        )?;

        let fetch_failures = IntCounterVec::new(
            Opts::new(
                "price_relay_fetch_failures_total",
                "Per-symbol upstream failures",
            ),
            &["pair", "class"],
        )?;

        let retries = IntCounterVec::new(
            Opts::new("price_relay_retries_total", "Attempts beyond the first"),
            &["operation"],
        )?;

        let feed_state = Gauge::new(
            "price_relay_feed_state",
            "Feed state (2=online, 1=degraded, 0=offline)",
        )?;

        let cycle_duration = HistogramVec::new(
            HistogramOpts::new(
                "price_relay_cycle_duration_seconds",
                "Wall time of one acquisition cycle",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["kind"],
        )?;

        let skipped_ticks = IntCounter::new(
            "price_relay_skipped_ticks_total",
            "Ticks skipped while a cycle was still active",
        )?;

        // Register all metrics
        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(fetch_failures.clone()))?;
        registry.register(Box::new(retries.clone()))?;
        registry.register(Box::new(feed_state.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;
        registry.register(Box::new(skipped_ticks.clone()))?;

        Ok(Self {
            registry,
            cycles,
            fetch_failures,
            retries,
            feed_state,
            cycle_duration,
            skipped_ticks,
        })
    }

    /// Render every registered metric in the text exposition format.
    ///
    /// # Errors
    /// Fails if encoding fails or produces invalid UTF-8.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl RelayMetrics for MetricsRegistry {
    fn record_fetch_failure(&self, pair: &str, class: ErrorClass) {
        self.fetch_failures
            .with_label_values(&[pair, class.as_str()])
            .inc();
    }

    fn record_retries(&self, operation: &str, attempts: u32) {
        if attempts > 1 {
            self.retries
                .with_label_values(&[operation])
                .inc_by(u64::from(attempts - 1));
        }
    }

    fn record_feed_state(&self, state: FeedState) {
        self.feed_state.set(state.as_gauge());
    }

    fn record_cycle(&self, outcome: &str) {
        self.cycles.with_label_values(&[outcome]).inc();
    }

    fn observe_cycle_duration(&self, kind: &str, elapsed: Duration) {
        self.cycle_duration
            .with_label_values(&[kind])
            .observe(elapsed.as_secs_f64());
    }

    fn record_skipped_tick(&self) {
        self.skipped_ticks.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_values() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.record_feed_state(FeedState::Degraded);
        metrics.record_fetch_failure("eur", ErrorClass::Soft);
        metrics.record_cycle("ok");
        metrics.record_retries("fetch", 3);
        metrics.record_retries("export", 1);
        metrics.observe_cycle_duration("cycle", Duration::from_millis(300));
        metrics.record_skipped_tick();

        let text = metrics.render().unwrap();
        assert!(text.contains("price_relay_feed_state 1"));
        assert!(text.lines().any(|line| line.starts_with("price_relay_fetch_failures_total")
            && line.contains("pair=\"eur\"")
            && line.contains("class=\"soft\"")
            && line.ends_with(" 1")));
        assert!(text.contains("price_relay_retries_total{operation=\"fetch\"} 2"));
        assert!(!text.contains("operation=\"export\""));
        assert!(text.contains("price_relay_cycle_duration_seconds_count{kind=\"cycle\"} 1"));
        assert!(text.contains("price_relay_skipped_ticks_total 1"));
    }
}
