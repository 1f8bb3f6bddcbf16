//! Tick-driven catch-up loop.
//!
//! Every tick runs one supervised iteration of the catch-up state machine:
//!
//! 1. refresh the ledger state;
//! 2. if the history store is behind, ingest `[history + 1, core]` in one session;
//! 3. if that session ingested anything, go back to 1.
//!
//! An iteration ends on a refresh error, a session error, a session that made
//! no progress, or once history has caught up. A panic anywhere inside it is
//! caught at the iteration boundary and reported; the ticker keeps running.

use crate::ingest::driver::IngestionDriver;
use crate::ingest::ingester::IngesterCore;
use crate::ingest::state::StateTracker;
use crate::ingest::types::IngestMode;
use crate::runtime::crash::{report_crash, CrashContext, PanicError};
use crate::runtime::error::IngestError;
use crate::runtime::telemetry;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Result of one supervised catch-up iteration.
#[derive(Debug)]
pub enum IterationOutcome {
    /// History is caught up, or the last session made no progress.
    Completed { ingested: u64 },
    /// A refresh or a session failed; the iteration stopped early.
    Failed(IngestError),
    /// The iteration panicked and the crash was reported.
    Panicked(PanicError),
}

impl IterationOutcome {
    pub fn ingested(&self) -> u64 {
        match self {
            IterationOutcome::Completed { ingested } => *ingested,
            IterationOutcome::Failed(err) => err.ingested(),
            IterationOutcome::Panicked(_) => 0,
        }
    }

    /// Collapses the outcome into the entry-point error shape; a caught panic
    /// becomes [`IngestError::Panic`].
    pub fn into_result(self) -> Result<u64, IngestError> {
        match self {
            IterationOutcome::Completed { ingested } => Ok(ingested),
            IterationOutcome::Failed(err) => Err(err),
            IterationOutcome::Panicked(panic) => Err(panic.into()),
        }
    }
}

/// Brings the history store up to the source store's latest ledger.
pub(crate) async fn catch_up(
    tracker: &StateTracker,
    driver: &IngestionDriver,
) -> Result<u64, IngestError> {
    let mut total: u64 = 0;

    loop {
        let state = tracker.refresh().await.map_err(|err| {
            tracing::error!(error = %err, "could not load ledger state");
            err
        })?;

        let Some(range) = state.pending_range() else {
            return Ok(total);
        };

        let result = driver.run_range(range, IngestMode::CatchUp).await;
        total += result.ingested;
        if let Some(err) = result.error {
            tracing::error!(%range, error = %err, "import session failed");
            return Err(err);
        }

        if result.ingested == 0 {
            tracing::warn!(%range, "import session ingested nothing; waiting for next tick");
            return Ok(total);
        }

        tracing::info!(%range, ingested = result.ingested, "ingested ledgers");
    }
}

/// Runs [`catch_up`] under a failure boundary that turns panics into reports.
pub(crate) async fn run_iteration(core: &IngesterCore) -> IterationOutcome {
    let outcome = AssertUnwindSafe(catch_up(&core.tracker, &core.driver))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(ingested)) => IterationOutcome::Completed { ingested },
        Ok(Err(err)) => {
            if err.is_state_query() {
                core.telemetry.record_refresh_failure();
            }
            IterationOutcome::Failed(err)
        }
        Err(payload) => {
            let panic = PanicError::from_panic(payload);
            core.telemetry.record_panic();
            let context = CrashContext {
                component: "poller",
                last_state: core.tracker.current(),
            };
            report_crash(core.crash_reporter.as_ref(), &panic, &context);
            IterationOutcome::Panicked(panic)
        }
    }
}

/// Owns the background tasks of a started ingester.
#[derive(Default)]
pub(crate) struct Poller {
    shutdown: Option<CancellationToken>,
    tick_handle: Option<JoinHandle<()>>,
    metrics_handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub(crate) fn is_running(&self) -> bool {
        match (&self.shutdown, &self.tick_handle) {
            (Some(token), Some(handle)) => !token.is_cancelled() && !handle.is_finished(),
            _ => false,
        }
    }

    /// True while a tick loop from an earlier `spawn` has not exited yet,
    /// including a closed one still finishing its in-flight iteration.
    pub(crate) fn is_draining(&self) -> bool {
        self.tick_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub(crate) fn spawn(&mut self, core: Arc<IngesterCore>) {
        debug_assert!(!self.is_draining(), "previous tick loop still running");
        let shutdown = CancellationToken::new();
        let metrics_handle = telemetry::spawn_metrics_reporter(
            core.telemetry.clone(),
            core.tracker.subscribe(),
            shutdown.clone(),
            core.config.metrics_interval(),
        );
        let tick_handle = tokio::spawn(tick_loop(core, shutdown.clone()));

        self.shutdown = Some(shutdown);
        self.tick_handle = Some(tick_handle);
        self.metrics_handle = Some(metrics_handle);
    }

    /// Prevents further ticks. An iteration already running is not interrupted.
    pub(crate) fn close(&self) {
        if let Some(token) = &self.shutdown {
            if !token.is_cancelled() {
                tracing::info!("canceling ingestion poller");
                token.cancel();
            }
        }
    }

    pub(crate) fn take_handles(&mut self) -> Vec<JoinHandle<()>> {
        self.shutdown = None;
        self.tick_handle
            .take()
            .into_iter()
            .chain(self.metrics_handle.take())
            .collect()
    }
}

async fn tick_loop(core: Arc<IngesterCore>, shutdown: CancellationToken) {
    let mut ticker = interval(core.config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                tracing::debug!("ticking ingester");
                run_iteration(&core).await;
            }
        }
    }

    tracing::info!("ingestion poller stopped");
}
