//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Pairs, assets, retry limits and scheduling are externalized
//! here - nothing is hardcoded in the domain layer. The config is
//! fixed at process start and handed to each component explicitly.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

use crate::domain::snapshot::{AssetSymbol, PairKey};
use crate::domain::validity::AgeLimit;

/// Top-level service configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before the service begins operation.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and metadata.
  pub service: ServiceConfig,
  /// Upstream feed and the pair × asset shape.
  pub feed: FeedConfig,
  /// Per-cycle retry limits.
  #[serde(default)]
  pub retry: RetryConfig,
  /// Cache file location and age limit.
  pub cache: CacheConfig,
  /// Tick alignment.
  pub scheduler: SchedulerConfig,
  /// Query/push/health HTTP server.
  #[serde(default)]
  pub server: ServerConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Upstream feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
  /// Exchange identifier (`binance` or `simulated`).
  pub exchange_id: String,
  /// REST base URL of the exchange.
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Per-request timeout in milliseconds.
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  /// Upstream request budget.
  #[serde(default = "default_requests_per_second")]
  pub requests_per_second: u32,
  /// Fiat pair keys (e.g. `eur`, `usd`).
  pub pairs: Vec<PairKey>,
  /// Asset symbols fetched for every pair (e.g. `BTC`).
  pub assets: Vec<AssetSymbol>,
  /// Accept partial batches during steady-state cycles.
  #[serde(default = "default_true")]
  pub pass_through: bool,
  /// Merge steady-state batches asset by asset.
  #[serde(default = "default_true")]
  pub force_granularity: bool,
  /// Simulated feed only: fail every n-th request softly.
  #[serde(default)]
  pub simulated_fail_every: Option<u32>,
}

impl FeedConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }
}

/// Retry limits (attempts, each >= 1).
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
  /// Attempts to read the cache at cold start.
  #[serde(default = "default_import_retries")]
  pub import: u32,
  /// Attempts to write the cache after a cycle.
  #[serde(default = "default_export_retries")]
  pub export: u32,
  /// Attempts to fetch a complete batch per pair.
  #[serde(default = "default_state_cache_retries")]
  pub state_cache: u32,
  /// Base backoff between attempts (milliseconds, doubles per attempt).
  #[serde(default = "default_base_delay_ms")]
  pub base_delay_ms: u64,
}

impl RetryConfig {
  pub fn base_delay(&self) -> Duration {
    Duration::from_millis(self.base_delay_ms)
  }
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      import: default_import_retries(),
      export: default_export_retries(),
      state_cache: default_state_cache_retries(),
      base_delay_ms: default_base_delay_ms(),
    }
  }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Path of the JSON cache file.
  #[serde(default = "default_cache_path")]
  pub path: String,
  /// Maximum age of a cached `current` that may be served without refetch.
  pub max_age: AgeLimit,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
  /// Whole minutes added to every delay after the first run.
  #[serde(default)]
  pub skip_minutes: u32,
  /// Second within the minute on which ticks align (1..=59).
  pub interval_seconds: u32,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Serve the query/push/health endpoints.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Bind address.
  #[serde(default = "default_bind_address")]
  pub bind_address: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_bind_address(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_base_url() -> String {
  "https://api.binance.com".to_string()
}

fn default_timeout_ms() -> u64 {
  10_000
}

fn default_requests_per_second() -> u32 {
  10
}

fn default_import_retries() -> u32 {
  3
}

fn default_export_retries() -> u32 {
  3
}

fn default_state_cache_retries() -> u32 {
  5
}

fn default_base_delay_ms() -> u64 {
  250
}

fn default_cache_path() -> String {
  "data/state.json".to_string()
}

fn default_bind_address() -> String {
  "0.0.0.0:8080".to_string()
}
