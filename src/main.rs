//! Price Relay - Entry Point
//!
//! Initializes configuration, logging and the acquisition stack, runs
//! the cold start, then keeps the feed fresh on a minute-aligned
//! schedule until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Build the ticker source, cache file, state store and gateway
//! 4. Cold start: cache → validate → import or fetch + reconcile (fatal on error)
//! 5. Spawn the API server (query, push, health, metrics)
//! 6. Spawn the scheduler loop
//! 7. Wait for SIGINT → graceful shutdown (stop scheduler → persist → exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use price_relay::adapters::api::gateway::PUSH_CAPACITY;
use price_relay::adapters::api::{ApiServer, Gateway};
use price_relay::adapters::feeds::build_source;
use price_relay::adapters::metrics::MetricsRegistry;
use price_relay::adapters::persistence::CacheFile;
use price_relay::config;
use price_relay::domain::retry::RetryPolicy;
use price_relay::domain::schedule::RequestGate;
use price_relay::domain::state::StateStore;
use price_relay::domain::telemetry::Telemetry;
use price_relay::ports::broadcast::Notifier;
use price_relay::ports::metrics::RelayMetrics;
use price_relay::ports::clock::{Clock, SystemClock};
use price_relay::usecases::acquisition::AcquisitionPipeline;
use price_relay::usecases::cycle::{CycleSettings, FeedCycle};
use price_relay::usecases::scheduler::Scheduler;

/// Config path override.
const CONFIG_ENV: &str = "PRICE_RELAY_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        exchange = %config.feed.exchange_id,
        pairs = ?config.feed.pairs,
        assets = ?config.feed.assets,
        "Starting price relay"
    );

    // ── 3. Shutdown signal channel ──────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 4. Build components ─────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let telemetry = Arc::new(Telemetry::default());
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to register metrics")?);
    let source = build_source(&config.feed).context("Failed to build ticker source")?;
    let state = StateStore::from_template(&config.feed.pairs, &config.feed.assets).into_shared();
    let cache = Arc::new(CacheFile::new(&config.cache.path));

    let gateway = Arc::new(Gateway::new(
        Arc::clone(&state),
        Arc::clone(&telemetry),
        Arc::clone(&clock),
        PUSH_CAPACITY,
    ));

    let pipeline = AcquisitionPipeline::new(
        source,
        config.feed.exchange_id.clone(),
        config.feed.assets.clone(),
        RetryPolicy::new(config.retry.state_cache).with_backoff(config.retry.base_delay()),
        Arc::clone(&telemetry),
        Arc::clone(&metrics) as Arc<dyn RelayMetrics>,
        Arc::clone(&clock),
    );

    let cycle = Arc::new(FeedCycle::new(
        pipeline,
        Arc::clone(&state),
        cache,
        Arc::clone(&gateway) as Arc<dyn Notifier>,
        Arc::clone(&metrics) as Arc<dyn RelayMetrics>,
        CycleSettings::from_config(&config),
    ));

    // ── 5. Cold start (no safe state to serve on failure) ───
    let feed_state = cycle
        .cold_start()
        .await
        .context("Cold start failed, nothing safe to serve")?;
    info!(state = %feed_state, "Cold start finished");

    // ── 6. Spawn API server ─────────────────────────────────
    let server_handle = if config.server.enabled {
        let server = ApiServer::new(
            Arc::clone(&gateway),
            Arc::clone(&metrics),
            config.server.bind_address.clone(),
        );
        let server_shutdown = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = server.run(server_shutdown).await {
                error!(error = %e, "API server failed");
            }
        }))
    } else {
        warn!("API server disabled, push and query surfaces unavailable");
        None
    };

    // ── 7. Spawn scheduler loop ─────────────────────────────
    let mut scheduler = Scheduler::new(
        Arc::clone(&cycle),
        Arc::clone(&clock),
        &config.scheduler,
        RequestGate::new(),
        Arc::clone(&metrics) as Arc<dyn RelayMetrics>,
    );
    let scheduler_shutdown = shutdown_tx.subscribe();
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.run_interval(scheduler_shutdown).await {
            error!(error = %e, "Scheduler failed");
        }
    });

    info!("All tasks spawned, relay is running");

    // ── 8. Wait for SIGINT ──────────────────────────────────
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for SIGINT, shutting down");
    } else {
        info!("SIGINT received, initiating graceful shutdown");
    }

    // ── Graceful shutdown ───────────────────────────────────

    // 1. Signal all tasks to stop
    let _ = shutdown_tx.send(());

    // 2. Let the in-flight cycle finish (up to 30s)
    if tokio::time::timeout(Duration::from_secs(30), scheduler_handle)
        .await
        .is_err()
    {
        warn!("Scheduler did not stop within 30s");
    }

    // 3. Persist the last state
    match cycle.persist_current().await {
        Ok(()) => info!(path = %config.cache.path, "Final state persisted"),
        Err(e) => warn!(error = %e, "Failed to persist final state"),
    }

    // 4. Wait for the API server to drain (up to 5s)
    if let Some(handle) = server_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}
