//! Interval-driven sweeps for the long-running service.
//!
//! Sweeps run one at a time on the blocking pool. When a sweep outlives
//! `run_timeout` the cycle is reported as failed but the sweep is left to
//! finish; later ticks are skipped until it has, so two sweeps never touch the
//! target concurrently. Every sweep is recorded in the metrics exactly once,
//! when it finishes.

use crate::error::SweepError;
use crate::metrics::SweepMetrics;
use crate::policy::{ConfigProvider, Invocation};
use crate::report::TextReporter;
use crate::sweep::{ExitStatus, Sweeper};
use common::config::ScheduleConfig;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{MissedTickBehavior, interval};

pub struct Scheduler<P> {
    sweeper: Arc<Sweeper<P>>,
    config: ScheduleConfig,
    metrics: SweepMetrics,
    in_flight: Mutex<Option<JoinHandle<ExitStatus>>>,
}

impl<P> Scheduler<P>
where
    P: ConfigProvider + Send + Sync + 'static,
{
    /// Sweeps record into `metrics`, replacing any metrics already attached
    /// to `sweeper`.
    pub fn new(sweeper: Sweeper<P>, config: ScheduleConfig, metrics: SweepMetrics) -> Self {
        Self {
            sweeper: Arc::new(sweeper.with_metrics(metrics.clone())),
            config,
            metrics,
            in_flight: Mutex::new(None),
        }
    }

    pub fn metrics(&self) -> &SweepMetrics {
        &self.metrics
    }

    /// Run sweeps on the configured interval until `shutdown` resolves.
    ///
    /// Returns the number of ticks handled.
    pub async fn run_until<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!(
            "Scheduler started: sweeping every {} (run on start: {})",
            humantime::format_duration(self.config.interval),
            self.config.run_on_start
        );

        if !self.config.run_on_start {
            // The first tick completes immediately.
            ticker.tick().await;
        }

        tokio::pin!(shutdown);
        let mut cycles = 0;

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    log::info!("Shutdown requested, stopping scheduler");
                    break;
                }
                _ = ticker.tick() => {
                    cycles += 1;
                    log::debug!("Running sweep cycle {cycles}");

                    match self.run_cycle().await {
                        Some(status) if status.is_success() => {
                            log::info!("Sweep cycle {cycles} succeeded");
                        }
                        Some(status) => {
                            log::error!(
                                "Sweep cycle {cycles} failed with exit code {}",
                                status.code()
                            );
                        }
                        None => {
                            log::warn!("Previous sweep still running, skipped cycle {cycles}");
                        }
                    }

                    self.metrics.summary().log();
                }
            }
        }

        cycles
    }

    /// Run one sweep unless the previous one is still in flight (`None`).
    pub async fn run_cycle(&self) -> Option<ExitStatus> {
        let previous = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if in_flight.as_ref().is_some_and(|h| !h.is_finished()) {
                return None;
            }
            in_flight.take()
        };

        // A timed-out sweep has finished; only a panic is left to account for.
        if let Some(previous) = previous {
            if let Err(err) = previous.await {
                self.record_join_error(&err);
            }
        }

        let sweeper = Arc::clone(&self.sweeper);
        let mut handle = tokio::task::spawn_blocking(move || {
            let mut reporter = TextReporter::stdout();
            sweeper
                .run(&Invocation::default(), &mut reporter)
                .exit_status()
        });

        let joined = match self.config.run_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    let err = SweepError::Timeout(limit);
                    tracing::error!(error = %err, "Sweep exceeded run timeout");
                    self.metrics.record_timeout();
                    *self.in_flight.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
                    return Some(ExitStatus::Failure(err.exit_code()));
                }
            },
            None => (&mut handle).await,
        };

        match joined {
            Ok(status) => Some(status),
            Err(err) => {
                self.record_join_error(&err);
                Some(ExitStatus::Failure(1))
            }
        }
    }

    fn record_join_error(&self, err: &JoinError) {
        tracing::error!(error = %err, "Sweep task did not complete");
        self.metrics.record_failure();
    }
}
