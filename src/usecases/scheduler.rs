//! Scheduler - Minute-Aligned Cycle Trigger
//!
//! Arms a timer for the next aligned tick, fires the cycle job, and
//! rearms. A tick that finds the previous cycle still running is
//! skipped, never queued. The loop owns its shutdown receiver and
//! exits when it fires.
//!
//! Phases: idle → armed → running → idle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Timelike;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::config::SchedulerConfig;
use crate::domain::schedule::{next_delay, RequestGate, SchedulerState};
use crate::ports::clock::Clock;
use crate::ports::metrics::RelayMetrics;

/// Work fired on every tick.
#[async_trait]
pub trait CycleJob: Send + Sync + 'static {
  /// Run one cycle. Errors are reported; the scheduler keeps going.
  async fn run(&self) -> Result<()>;
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
  /// The job was started.
  Dispatched,
  /// The previous cycle was still active.
  Skipped,
}

/// Self-realigning periodic trigger with overlap suppression.
pub struct Scheduler<J: CycleJob> {
  /// Job fired on each tick.
  job: Arc<J>,
  /// Wall clock used for alignment.
  clock: Arc<dyn Clock>,
  /// Minutes added after the first run.
  skip_minutes: u32,
  /// Pivot second within the minute.
  interval_seconds: u32,
  /// Counter, first-run flag, armed flag and overlap gate.
  state: SchedulerState,
  /// Skipped-tick counter.
  metrics: Arc<dyn RelayMetrics>,
  /// Most recently dispatched cycle.
  in_flight: Option<JoinHandle<()>>,
}

impl<J: CycleJob> Scheduler<J> {
  /// Create a new scheduler.
  pub fn new(
    job: Arc<J>,
    clock: Arc<dyn Clock>,
    config: &SchedulerConfig,
    gate: RequestGate,
    metrics: Arc<dyn RelayMetrics>,
  ) -> Self {
    Self {
      job,
      clock,
      skip_minutes: config.skip_minutes,
      interval_seconds: config.interval_seconds,
      state: SchedulerState::new(gate),
      metrics,
      in_flight: None,
    }
  }

  pub fn state(&self) -> &SchedulerState {
    &self.state
  }

  /// Compute the delay to the next aligned tick and mark the scheduler armed.
  pub fn arm(&mut self) -> Duration {
    let second = self.clock.now().second();
    let delay = next_delay(
      second,
      self.interval_seconds,
      self.skip_minutes,
      self.state.is_first_run,
    );
    self.state.is_first_run = false;
    self.state.armed = true;
    delay
  }

  /// Handle one tick: skip if a cycle is active, otherwise start the job.
  ///
  /// The overlap flag is set before the job starts and cleared by a
  /// guard owned by the job's task, on every exit path.
  pub fn fire(&mut self) -> TickOutcome {
    self.state.counter += 1;
    self.state.armed = false;

    let Some(guard) = self.state.gate.try_acquire() else {
      warn!(tick = self.state.counter, "Previous cycle still active, skipping tick");
      self.metrics.record_skipped_tick();
      return TickOutcome::Skipped;
    };

    let job = Arc::clone(&self.job);
    let tick = self.state.counter;

    self.in_flight = Some(tokio::spawn(async move {
      let _guard = guard;
      if let Err(e) = job.run().await {
        error!(tick, error = %e, "Cycle failed");
      }
    }));

    TickOutcome::Dispatched
  }

  /// Run until shutdown: arm, wait, fire, rearm.
  ///
  /// On shutdown the in-flight cycle, if any, is awaited before returning.
  #[instrument(skip(self, shutdown_rx), name = "scheduler_loop")]
  pub async fn run_interval(&mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    info!(
      interval_seconds = self.interval_seconds,
      skip_minutes = self.skip_minutes,
      "Scheduler started"
    );

    loop {
      let delay = self.arm();
      info!(
        delay_ms = delay.as_millis() as u64,
        tick = self.state.counter + 1,
        "Next cycle armed"
      );

      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Scheduler received shutdown signal");
          break;
        }
        () = tokio::time::sleep(delay) => {}
      }

      self.fire();
    }

    self.state.armed = false;
    if let Some(handle) = self.in_flight.take() {
      if let Err(e) = handle.await {
        error!(error = %e, "In-flight cycle panicked");
      }
    }

    info!(ticks = self.state.counter, "Scheduler stopped");
    Ok(())
  }
}
