//! Periodic invocation of a syncer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::types::SyncSettings;
use crate::errors::{self, compute_backoff};
use crate::result::CycleReport;
use crate::syncer::GenericSyncer;

/// Cadence of a [`SyncerRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerOptions {
    pub interval: Duration,
    pub max_backoff: Duration,
    /// Stop after this many cycles. Runs until cancelled when `None`.
    pub max_cycles: Option<u64>,
}

impl RunnerOptions {
    #[must_use]
    pub fn from_settings(sync: &SyncSettings) -> Self {
        Self {
            interval: sync.interval(),
            max_backoff: sync.max_backoff(),
            max_cycles: None,
        }
    }

    #[must_use]
    pub fn with_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }
}

/// Cycle counts of one [`SyncerRunner::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerSummary {
    pub cycles: u64,
    pub committed: u64,
    pub aborted: u64,
    /// Cycles that ended in a [`SyncError`](crate::errors::SyncError).
    pub errors: u64,
}

/// Runs `sync_once` every interval on a blocking thread until cancelled.
///
/// The syncer sits behind a mutex, so at most one cycle per syncer runs at
/// a time even if the runner is cloned.
#[derive(Clone)]
pub struct SyncerRunner {
    syncer: Arc<Mutex<GenericSyncer>>,
    options: RunnerOptions,
    cancel: CancellationToken,
}

impl SyncerRunner {
    #[must_use]
    pub fn new(syncer: GenericSyncer, options: RunnerOptions) -> Self {
        Self {
            syncer: Arc::new(Mutex::new(syncer)),
            options,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Run a single cycle on the blocking pool.
    ///
    /// # Errors
    ///
    /// The outer error means the cycle task panicked or the syncer lock was
    /// poisoned; the inner one is the syncer's own [`SyncError`](crate::errors::SyncError).
    pub async fn run_once(&self) -> Result<errors::Result<CycleReport>> {
        let syncer = Arc::clone(&self.syncer);
        tokio::task::spawn_blocking(move || {
            let mut syncer = syncer
                .lock()
                .map_err(|_| anyhow::anyhow!("syncer lock poisoned"))?;
            Ok(syncer.sync_once())
        })
        .await
        .context("sync cycle task panicked")?
    }

    /// Loop until cancelled or `max_cycles` is reached.
    ///
    /// Consecutive aborted or failed cycles stretch the wait between cycles
    /// via [`compute_backoff`]; a committed cycle resets it.
    ///
    /// # Errors
    ///
    /// Returns an error only if a cycle task panicked.
    pub async fn run(&self) -> Result<RunnerSummary> {
        let mut summary = RunnerSummary::default();
        let mut consecutive_failures = 0u32;

        while !self.cancel.is_cancelled() {
            let outcome = self.run_once().await?;
            summary.cycles += 1;

            match outcome {
                Ok(report) if report.is_committed() => {
                    summary.committed += 1;
                    consecutive_failures = 0;
                }
                Ok(_) => {
                    summary.aborted += 1;
                    consecutive_failures = consecutive_failures.saturating_add(1);
                }
                Err(err) => {
                    summary.errors += 1;
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    tracing::error!(error = %err, "Sync cycle failed");
                }
            }

            if self.options.max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }

            let delay = compute_backoff(
                self.options.interval,
                self.options.max_backoff,
                consecutive_failures,
            );
            if consecutive_failures > 0 {
                tracing::warn!(
                    consecutive_failures,
                    delay_secs = delay.as_secs_f64(),
                    "Backing off before next cycle"
                );
            }

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(
            cycles = summary.cycles,
            committed = summary.committed,
            aborted = summary.aborted,
            errors = summary.errors,
            "Syncer runner stopped"
        );
        Ok(summary)
    }
}
