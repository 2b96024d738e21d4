//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    pairs = config.feed.pairs.len(),
    assets = config.feed.assets.len(),
    exchange = %config.feed.exchange_id,
    interval_seconds = config.scheduler.interval_seconds,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
///
/// # Errors
/// Fails on TOML syntax errors or validation rule violations.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content)
    .with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-empty, duplicate-free pair and asset lists
/// - Retry limits of at least one attempt
/// - An interval inside the minute and a non-zero cache age
fn validate_config(config: &AppConfig) -> Result<()> {
  // Feed shape validation
  anyhow::ensure!(
    !config.feed.pairs.is_empty(),
    "At least one pair must be configured"
  );
  anyhow::ensure!(
    !config.feed.assets.is_empty(),
    "At least one asset must be configured"
  );
  ensure_unique("pair", &config.feed.pairs)?;
  ensure_unique("asset", &config.feed.assets)?;
  anyhow::ensure!(
    !config.feed.exchange_id.is_empty(),
    "exchange_id must not be empty"
  );
  anyhow::ensure!(
    config.feed.requests_per_second > 0,
    "requests_per_second must be positive"
  );
  if let Some(n) = config.feed.simulated_fail_every {
    anyhow::ensure!(n > 0, "simulated_fail_every must be positive, got {n}");
  }

  // Retry validation
  anyhow::ensure!(
    config.retry.import >= 1 && config.retry.export >= 1 && config.retry.state_cache >= 1,
    "Retry limits must be at least 1 (import={}, export={}, state_cache={})",
    config.retry.import,
    config.retry.export,
    config.retry.state_cache
  );

  // Scheduler validation
  anyhow::ensure!(
    (1..=59).contains(&config.scheduler.interval_seconds),
    "interval_seconds must be in [1, 59], got {}",
    config.scheduler.interval_seconds
  );

  // Cache validation
  anyhow::ensure!(
    !config.cache.max_age.is_zero(),
    "cache.max_age must not be zero"
  );
  anyhow::ensure!(
    !config.cache.path.is_empty(),
    "cache.path must not be empty"
  );

  Ok(())
}

fn ensure_unique(kind: &str, keys: &[String]) -> Result<()> {
  let mut seen = HashSet::new();
  for key in keys {
    anyhow::ensure!(!key.is_empty(), "Empty {kind} key configured");
    anyhow::ensure!(seen.insert(key.as_str()), "Duplicate {kind} key: {key}");
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  const VALID: &str = r#"
    [service]
    name = "relay"

    [feed]
    exchange_id = "simulated"
    pairs = ["eur", "usd"]
    assets = ["BTC", "ETH"]

    [cache]
    max_age = { minutes = 5 }

    [scheduler]
    interval_seconds = 30
  "#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_parse_valid_with_defaults() {
    let config = parse_config(VALID).unwrap();
    assert_eq!(config.feed.pairs, vec!["eur", "usd"]);
    assert_eq!(config.retry.state_cache, 5);
    assert_eq!(config.cache.max_age.minutes, 5);
    assert_eq!(config.cache.path, "data/state.json");
    assert!(config.feed.pass_through);
    assert_eq!(config.scheduler.skip_minutes, 0);
    assert!(config.server.enabled);
  }

  #[test]
  fn test_rejects_duplicate_pairs() {
    let toml = VALID.replace(r#"["eur", "usd"]"#, r#"["eur", "eur"]"#);
    assert!(parse_config(&toml).is_err());
  }

  #[test]
  fn test_rejects_interval_outside_minute() {
    let toml = VALID.replace("interval_seconds = 30", "interval_seconds = 60");
    assert!(parse_config(&toml).is_err());
  }

  #[test]
  fn test_rejects_zero_age() {
    let toml = VALID.replace("{ minutes = 5 }", "{}");
    assert!(parse_config(&toml).is_err());
  }
}
