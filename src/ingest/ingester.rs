//! Operator-facing ingestion orchestrator.
//!
//! `Ingester` wires the state tracker, the ingestion driver, and the poller
//! together and exposes the entry points an administrative surface calls:
//! catch-up polling (`start` / `close`), full, ranged and single-ledger
//! reingestion, and the outdated-ledger sweep.
//!
//! Entry points may be called from any task, including while the poller is
//! mid-iteration. Overlapping ranges are only serialized when
//! `serialize_overlapping_ranges` is configured.

use super::driver::IngestionDriver;
use super::poller::{self, IterationOutcome, Poller};
use super::range_lock::RangeLocks;
use super::state::StateTracker;
use super::sweep::OutdatedSweep;
use super::types::{IngestMode, LedgerRange, LedgerSequence, OrchestratorState};
use crate::runtime::config::IngestConfig;
use crate::runtime::crash::{CrashReporter, LogCrashReporter};
use crate::runtime::error::IngestError;
use crate::runtime::telemetry::Telemetry;
use crate::store::cache::AccountCache;
use crate::store::ledger::{HistoryStore, SourceLedgerStore};
use crate::store::session::{SessionContext, SessionFactory};
use anyhow::{bail, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

pub(crate) struct IngesterCore {
    pub(crate) config: IngestConfig,
    pub(crate) tracker: StateTracker,
    pub(crate) driver: IngestionDriver,
    pub(crate) history: Arc<dyn HistoryStore>,
    pub(crate) telemetry: Arc<Telemetry>,
    pub(crate) crash_reporter: Arc<dyn CrashReporter>,
}

pub struct Ingester {
    core: Arc<IngesterCore>,
    poller: Mutex<Poller>,
}

impl Ingester {
    /// Creates an ingester that reports poller crashes through [`LogCrashReporter`].
    pub fn new(
        config: IngestConfig,
        source: Arc<dyn SourceLedgerStore>,
        history: Arc<dyn HistoryStore>,
        sessions: impl SessionFactory,
    ) -> Self {
        Self::with_crash_reporter(config, source, history, sessions, Arc::new(LogCrashReporter))
    }

    pub fn with_crash_reporter(
        config: IngestConfig,
        source: Arc<dyn SourceLedgerStore>,
        history: Arc<dyn HistoryStore>,
        sessions: impl SessionFactory,
        crash_reporter: Arc<dyn CrashReporter>,
    ) -> Self {
        debug_assert!(
            config.validate().is_ok(),
            "IngestConfig should have been validated at construction time"
        );

        let telemetry = Arc::new(Telemetry::default());
        let context = SessionContext {
            history: history.clone(),
            source: source.clone(),
            account_cache: Arc::new(AccountCache::new(config.account_cache_capacity())),
            telemetry: telemetry.clone(),
        };
        let range_locks = config
            .serialize_overlapping_ranges()
            .then(RangeLocks::new);
        let driver = IngestionDriver::new(
            Box::new(sessions),
            context,
            config.ingest_version(),
            range_locks,
        );

        let core = IngesterCore {
            tracker: StateTracker::new(source, history.clone()),
            driver,
            history,
            telemetry,
            crash_reporter,
            config,
        };

        Self {
            core: Arc::new(core),
            poller: Mutex::new(Poller::default()),
        }
    }

    /// Returns a reference to the ingester's configuration.
    pub fn config(&self) -> &IngestConfig {
        &self.core.config
    }

    /// Last successfully refreshed ledger state.
    pub fn state(&self) -> OrchestratorState {
        self.core.tracker.current()
    }

    /// Watch channel that yields every refreshed ledger state.
    pub fn subscribe_state(&self) -> watch::Receiver<OrchestratorState> {
        self.core.tracker.subscribe()
    }

    /// Returns a clone of the telemetry handle for observability.
    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.core.telemetry.clone()
    }

    /// Cache shared by every session this ingester creates.
    pub fn account_cache(&self) -> Arc<AccountCache> {
        self.core.driver.context().account_cache.clone()
    }

    /// Reloads the latest source and history sequences.
    pub async fn refresh(&self) -> Result<OrchestratorState, IngestError> {
        self.core.tracker.refresh().await
    }

    /// Runs a single supervised catch-up iteration, exactly as one poller tick does.
    pub async fn run_once(&self) -> IterationOutcome {
        poller::run_iteration(&self.core).await
    }

    /// Re-ingests every ledger from 1 up to the source store's latest.
    pub async fn reingest_all(&self) -> Result<u64, IngestError> {
        let state = self.core.tracker.refresh().await?;
        if state.core_sequence == 0 {
            tracing::info!("source store is empty; nothing to reingest");
            return Ok(0);
        }
        self.reingest_range(1, state.core_sequence).await
    }

    /// Re-ingests `[start, end]`, overwriting existing history rows.
    pub async fn reingest_range(
        &self,
        start: LedgerSequence,
        end: LedgerSequence,
    ) -> Result<u64, IngestError> {
        let range = LedgerRange::new(start, end)?;
        tracing::info!(%range, "reingesting ledger range");
        self.core
            .driver
            .run_range(range, IngestMode::Reingest)
            .await
            .into_result()
    }

    /// Re-ingests a single ledger.
    pub async fn reingest_single(&self, sequence: LedgerSequence) -> Result<u64, IngestError> {
        self.reingest_range(sequence, sequence).await
    }

    /// Finds ledgers ingested under an older version and re-ingests them.
    ///
    /// Returns the total number of ledgers re-ingested. The first failing range
    /// aborts the sweep with [`IngestError::SweepAborted`].
    pub async fn reingest_outdated(&self) -> Result<u64, IngestError> {
        let core = &self.core;
        OutdatedSweep {
            history: core.history.as_ref(),
            driver: &core.driver,
            telemetry: &core.telemetry,
            version: core.config.ingest_version(),
            page_size: core.config.outdated_batch_size(),
            limits: core.config.sweep_limits(),
        }
        .run()
        .await
    }

    /// Starts polling the source store on the configured interval.
    ///
    /// Must be called from within a tokio runtime. Fails if the poller is
    /// already running, or if a closed poller is still finishing its last
    /// iteration. A fully stopped ingester may be started again.
    pub fn start(&self) -> Result<()> {
        let mut poller = self.lock_poller();
        if poller.is_running() {
            bail!("ingester already running");
        }
        if poller.is_draining() {
            bail!("ingester is still stopping; await stop() before restarting");
        }

        tracing::info!(
            poll_interval_ms = self.core.config.poll_interval().as_millis() as u64,
            version = self.core.config.ingest_version(),
            "starting ingestion poller"
        );
        poller.spawn(self.core.clone());
        Ok(())
    }

    /// Stops the poller from firing further ticks. Safe to call repeatedly.
    pub fn close(&self) {
        self.lock_poller().close();
    }

    /// Closes the poller and waits for its tasks, including any in-flight
    /// iteration, to finish.
    pub async fn stop(&self) {
        let handles = {
            let mut poller = self.lock_poller();
            poller.close();
            poller.take_handles()
        };

        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "ingestion poller task terminated unexpectedly");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_poller().is_running()
    }

    fn lock_poller(&self) -> MutexGuard<'_, Poller> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Ingester {
    fn drop(&mut self) {
        self.lock_poller().close();
    }
}
