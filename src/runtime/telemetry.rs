use crate::ingest::types::OrchestratorState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters shared by the orchestrator and every ingestion session.
///
/// Sessions receive this as their metrics sink and may record per-ledger
/// counters themselves; the orchestrator records session-level outcomes.
#[derive(Default, Debug)]
pub struct Telemetry {
    ingested_ledgers: AtomicU64,
    reingested_ledgers: AtomicU64,
    sessions_started: AtomicU64,
    session_failures: AtomicU64,
    refresh_failures: AtomicU64,
    panics: AtomicU64,
    sweep_queries: AtomicU64,
}

impl Telemetry {
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_failure(&self) {
        self.session_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ingested(&self, count: u64, overwrite: bool) {
        if count == 0 {
            return;
        }
        if overwrite {
            self.reingested_ledgers.fetch_add(count, Ordering::Relaxed);
        } else {
            self.ingested_ledgers.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn record_refresh_failure(&self) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sweep_query(&self) {
        self.sweep_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            ingested_ledgers: self.ingested_ledgers.load(Ordering::Relaxed),
            reingested_ledgers: self.reingested_ledgers.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            session_failures: self.session_failures.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
            sweep_queries: self.sweep_queries.load(Ordering::Relaxed),
        }
    }

    pub fn ingested_ledgers(&self) -> u64 {
        self.ingested_ledgers.load(Ordering::Relaxed)
    }

    pub fn reingested_ledgers(&self) -> u64 {
        self.reingested_ledgers.load(Ordering::Relaxed)
    }

    pub fn panics(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub ingested_ledgers: u64,
    pub reingested_ledgers: u64,
    pub sessions_started: u64,
    pub session_failures: u64,
    pub refresh_failures: u64,
    pub panics: u64,
    pub sweep_queries: u64,
}

/// Spawns a background task that periodically logs ingestion throughput and the
/// last observed ledger state.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    state: watch::Receiver<OrchestratorState>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "ledgersync::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let ingested_delta = current_snapshot
                        .ingested_ledgers
                        .saturating_sub(last_snapshot.ingested_ledgers);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        ingested_delta as f64 / elapsed
                    };
                    let OrchestratorState { core_sequence, history_sequence } = *state.borrow();

                    tracing::info!(
                        target: "ledgersync::metrics",
                        throughput = format!("{throughput:.2}"),
                        ingested = current_snapshot.ingested_ledgers,
                        reingested = current_snapshot.reingested_ledgers,
                        core_sequence,
                        history_sequence,
                        lag = core_sequence.saturating_sub(history_sequence),
                        sessions = current_snapshot.sessions_started,
                        session_failures = current_snapshot.session_failures,
                        refresh_failures = current_snapshot.refresh_failures,
                        panics = current_snapshot.panics,
                        "ingestion metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
