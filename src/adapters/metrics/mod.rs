//! Metrics and Monitoring Adapters
//!
//! Prometheus counters and gauges for cycle outcomes, upstream
//! failures and feed health. Exposed on `/metrics` by the API server.

pub mod prometheus;

pub use prometheus::MetricsRegistry;
