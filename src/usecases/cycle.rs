//! Feed Cycle - Cold Start and Steady-State Orchestration
//!
//! One cycle: fetch every pair → shuffle `current` into `previous` →
//! merge the fresh batches → derive feed health → persist → notify.
//!
//! Cold start runs once before the scheduler is armed. It decides from
//! the on-disk cache whether a fetch is needed at all, and a failure
//! there is fatal for the process. Steady-state failures are reported
//! and the scheduler rearms.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::acquisition::AcquisitionPipeline;
use super::scheduler::CycleJob;
use crate::config::AppConfig;
use crate::domain::error::{CacheError, FeedError, StateError, ValidationError};
use crate::domain::retry::{RetryError, RetryPolicy};
use crate::domain::snapshot::{Generation, Generations, PairKey, Snapshot};
use crate::domain::state::SharedState;
use crate::domain::telemetry::FeedState;
use crate::domain::validity::{self, AgeLimit, ValidityReport};
use crate::ports::broadcast::{Notification, Notifier};
use crate::ports::metrics::RelayMetrics;
use crate::ports::repository::CacheStore;

/// Failures that abort a cycle.
#[derive(Error, Debug)]
pub enum CycleError {
  #[error("fetch for pair {pair} failed: {error}")]
  Fetch {
    pair: PairKey,
    error: RetryError<FeedError>,
  },

  #[error(transparent)]
  State(#[from] StateError),

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error("cache import failed: {0}")]
  Import(RetryError<CacheError>),

  #[error("cache export failed: {0}")]
  Export(RetryError<CacheError>),
}

/// Per-cycle knobs, fixed at process start.
#[derive(Debug, Clone)]
pub struct CycleSettings {
  /// Configured pair keys, in fetch order.
  pub pairs: Vec<PairKey>,
  /// Accept partial batches in steady state.
  pub pass_through: bool,
  /// Granular merge in steady state.
  pub force_granularity: bool,
  /// Cache age budget.
  pub max_age: AgeLimit,
  /// Cache read attempts.
  pub import_retry: RetryPolicy,
  /// Cache write attempts.
  pub export_retry: RetryPolicy,
}

impl CycleSettings {
  pub fn from_config(config: &AppConfig) -> Self {
    let backoff = config.retry.base_delay();
    Self {
      pairs: config.feed.pairs.clone(),
      pass_through: config.feed.pass_through,
      force_granularity: config.feed.force_granularity,
      max_age: config.cache.max_age,
      import_retry: RetryPolicy::new(config.retry.import).with_backoff(backoff),
      export_retry: RetryPolicy::new(config.retry.export).with_backoff(backoff),
    }
  }
}

/// Cycle orchestrator shared by cold start, the scheduler and shutdown.
pub struct FeedCycle {
  pipeline: AcquisitionPipeline,
  state: SharedState,
  cache: Arc<dyn CacheStore>,
  notifier: Arc<dyn Notifier>,
  metrics: Arc<dyn RelayMetrics>,
  settings: CycleSettings,
}

impl FeedCycle {
  /// Create a new orchestrator.
  pub fn new(
    pipeline: AcquisitionPipeline,
    state: SharedState,
    cache: Arc<dyn CacheStore>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<dyn RelayMetrics>,
    settings: CycleSettings,
  ) -> Self {
    Self {
      pipeline,
      state,
      cache,
      notifier,
      metrics,
      settings,
    }
  }

  pub fn settings(&self) -> &CycleSettings {
    &self.settings
  }

  /// Read and decode the cache file through the import retry policy.
  ///
  /// A missing or malformed cache is `Ok(None)`.
  ///
  /// # Errors
  /// `Import` when reads keep failing until the limit, or on a fatal
  /// cache error.
  pub async fn load_cache(&self) -> Result<Option<Generations>, CycleError> {
    let attempts = AtomicU32::new(0);
    let result = self
      .settings
      .import_retry
      .execute("import", |attempt| {
        attempts.store(attempt, Ordering::Relaxed);
        self.read_cache()
      })
      .await;
    self.metrics.record_retries("import", attempts.load(Ordering::Relaxed));

    match result {
      Ok(None) => {
        info!(path = %self.cache.location(), "No cache on disk");
        Ok(None)
      }
      Ok(cache) => Ok(cache),
      Err(RetryError::Abandoned { error, .. }) => {
        warn!(path = %self.cache.location(), error = %error, "Cache unusable, treating as absent");
        Ok(None)
      }
      Err(e) => Err(CycleError::Import(e)),
    }
  }

  /// Serialize once and write through the export retry policy.
  ///
  /// # Errors
  /// `Export` when writes keep failing until the limit.
  pub async fn persist(&self, generations: &Generations) -> Result<(), CycleError> {
    let bytes = serde_json::to_vec_pretty(generations)
      .map_err(|e| CycleError::Export(RetryError::Fatal(CacheError::Serialization(e.to_string()))))?;

    let attempts = AtomicU32::new(0);
    let result = self
      .settings
      .export_retry
      .execute("export", |attempt| {
        attempts.store(attempt, Ordering::Relaxed);
        self.cache.write(&bytes)
      })
      .await;
    self.metrics.record_retries("export", attempts.load(Ordering::Relaxed));

    result.map_err(CycleError::Export)?;
    debug!(path = %self.cache.location(), bytes = bytes.len(), "State persisted");
    Ok(())
  }

  /// Persist whatever the store currently holds. Used on shutdown.
  ///
  /// # Errors
  /// See [`FeedCycle::persist`].
  pub async fn persist_current(&self) -> Result<(), CycleError> {
    let exported = self.state.read().await.export_all();
    self.persist(&exported).await
  }

  /// Initialize the store from the cache, the upstream, or both.
  ///
  /// - fully valid, up-to-date cache: imported as-is, connectivity checked
  /// - cache present but not up to date: fresh complete data reconciled
  ///   with whatever cache field is still valid
  /// - no usable cache: fresh complete data into `current`
  ///
  /// # Errors
  /// Any error here leaves nothing safe to serve; the caller exits.
  #[instrument(skip(self))]
  pub async fn cold_start(&self) -> Result<FeedState, CycleError> {
    let started = Instant::now();
    let pairs = &self.settings.pairs;

    let (state, fetched) = match self.load_cache().await? {
      Some(cache) => {
        let now_ms = self.pipeline.clock().now_ms();
        let reports: BTreeMap<PairKey, ValidityReport> = pairs
          .iter()
          .map(|pair| {
            let report = validity::validate(
              &cache,
              pair,
              self.pipeline.assets(),
              &self.settings.max_age,
              now_ms,
            );
            (pair.clone(), report)
          })
          .collect();
        let (consolidated, table) = validity::consolidate(&reports)?;
        info!(
          current = consolidated.current,
          previous = consolidated.previous,
          up_to_date = consolidated.up_to_date,
          "Cache validity\n{table}"
        );

        if consolidated.up_to_date {
          self.state.write().await.import_all(cache);
          (self.pipeline.check_connectivity(pairs).await, false)
        } else {
          let fresh = self.fetch_complete(pairs).await?;
          let mut store = self.state.write().await;
          for (pair, snapshot) in fresh {
            if let Some(report) = reports.get(&pair) {
              let outcome = store.reconcile(&pair, &cache, report, snapshot);
              info!(pair = %pair, outcome = ?outcome, "Cache reconciled");
            }
          }
          (FeedState::aggregate(store.current_flags()), true)
        }
      }
      None => {
        let fresh = self.fetch_complete(pairs).await?;
        let mut store = self.state.write().await;
        for (pair, snapshot) in &fresh {
          store.merge(Generation::Current, pair, snapshot, false)?;
        }
        (FeedState::aggregate(store.current_flags()), true)
      }
    };

    self.pipeline.telemetry().set(state);
    self.metrics.record_feed_state(state);

    if fetched {
      if let Err(e) = self.persist_current().await {
        warn!(error = %e, "Cold-start export failed, continuing");
      }
    }

    self.metrics.record_cycle("cold_start");
    self.metrics.observe_cycle_duration("cold_start", started.elapsed());
    self.notifier.notify(Notification {
      signal: true,
      data_feed_state: state,
    });

    info!(state = %state, fetched, "Cold start complete");
    Ok(state)
  }

  /// One steady-state cycle.
  ///
  /// Pairs whose fetch is exhausted or abandoned keep their stored values
  /// and count as all-failed for feed health. A fatal fetch aborts the
  /// cycle before anything is merged.
  ///
  /// # Errors
  /// `Fetch` on a fatal upstream failure, `State` on a store contract
  /// violation. Export failures are logged only.
  #[instrument(skip(self))]
  pub async fn run_cycle(&self) -> Result<FeedState, CycleError> {
    let started = Instant::now();
    let n_assets = self.pipeline.assets().len();

    let results = self
      .pipeline
      .fetch_all(&self.settings.pairs, self.settings.pass_through)
      .await;

    let mut fetched: Vec<(PairKey, Snapshot)> = Vec::with_capacity(results.len());
    let mut flags = Vec::with_capacity(self.settings.pairs.len() * n_assets);
    let mut failed = 0usize;

    for (pair, result) in results {
      match result {
        Ok(snapshot) => {
          flags.extend(snapshot.success_flags());
          fetched.push((pair, snapshot));
        }
        Err(error) if error.is_fatal() => return Err(CycleError::Fetch { pair, error }),
        Err(error) => {
          warn!(pair = %pair, error = %error, "Pair not refreshed, keeping stored values");
          failed += 1;
          flags.extend(std::iter::repeat_n(false, n_assets));
        }
      }
    }

    let exported = {
      let mut store = self.state.write().await;
      store.shuffle(Generation::Current, Generation::Previous)?;
      for (pair, snapshot) in &fetched {
        store.merge(
          Generation::Current,
          pair,
          snapshot,
          self.settings.force_granularity,
        )?;
      }
      store.export_all()
    };

    let state = FeedState::aggregate(flags);
    self.pipeline.telemetry().set(state);
    self.metrics.record_feed_state(state);

    if let Err(e) = self.persist(&exported).await {
      warn!(error = %e, "Export failed, state kept in memory");
    }

    let outcome = match (fetched.len(), failed) {
      (_, 0) => "ok",
      (0, _) => "failed",
      _ => "partial",
    };
    self.metrics.record_cycle(outcome);
    self.metrics.observe_cycle_duration("cycle", started.elapsed());

    self.notifier.notify(Notification {
      signal: !fetched.is_empty(),
      data_feed_state: state,
    });

    info!(
      refreshed = fetched.len(),
      failed,
      state = %state,
      outcome,
      "Cycle complete"
    );
    Ok(state)
  }

  async fn read_cache(&self) -> Result<Option<Generations>, CacheError> {
    match self.cache.read().await? {
      Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      None => Ok(None),
    }
  }

  /// Fetch every pair with the complete-data requirement.
  async fn fetch_complete(&self, pairs: &[PairKey]) -> Result<Vec<(PairKey, Snapshot)>, CycleError> {
    let mut fresh = Vec::with_capacity(pairs.len());
    for (pair, result) in self.pipeline.fetch_all(pairs, false).await {
      match result {
        Ok(snapshot) => fresh.push((pair, snapshot)),
        Err(error) => return Err(CycleError::Fetch { pair, error }),
      }
    }
    Ok(fresh)
  }

  /// Steady-state failure: feed offline, subscribers told there is nothing new.
  fn report_failure(&self, e: &CycleError) {
    error!(error = %e, "Cycle aborted");
    self.pipeline.telemetry().set(FeedState::Offline);
    self.metrics.record_feed_state(FeedState::Offline);
    self.metrics.record_cycle("fatal");
    self.notifier.notify(Notification {
      signal: false,
      data_feed_state: FeedState::Offline,
    });
  }
}

#[async_trait]
impl CycleJob for FeedCycle {
  async fn run(&self) -> anyhow::Result<()> {
    match self.run_cycle().await {
      Ok(_) => Ok(()),
      Err(e) => {
        self.report_failure(&e);
        Err(e.into())
      }
    }
  }
}
