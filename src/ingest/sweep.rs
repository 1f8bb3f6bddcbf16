//! Re-ingestion of ledgers stored under an older ingestion version.

use crate::ingest::batch::RangeBatcher;
use crate::ingest::driver::IngestionDriver;
use crate::ingest::types::{IngestMode, IngestionVersion, LedgerSequence};
use crate::runtime::config::SweepLimits;
use crate::runtime::error::IngestError;
use crate::runtime::telemetry::Telemetry;
use crate::store::ledger::HistoryStore;
use anyhow::Context;

pub(crate) struct OutdatedSweep<'a> {
    pub history: &'a dyn HistoryStore,
    pub driver: &'a IngestionDriver,
    pub telemetry: &'a Telemetry,
    pub version: IngestionVersion,
    pub page_size: usize,
    pub limits: SweepLimits,
}

impl OutdatedSweep<'_> {
    /// Queries outdated ledgers page by page and re-ingests them one
    /// contiguous range at a time until the query comes back empty.
    ///
    /// Without [`SweepLimits`] this only ends on an empty page or an error, so
    /// a session that silently leaves a ledger outdated keeps it looping.
    pub(crate) async fn run(self) -> Result<u64, IngestError> {
        let mut total: u64 = 0;
        let mut iterations: usize = 0;
        let mut previous: Option<Vec<LedgerSequence>> = None;

        loop {
            self.telemetry.record_sweep_query();
            let outdated = self
                .history
                .oldest_outdated_ledgers(self.version, self.page_size)
                .await
                .context("failed to query outdated ledgers")
                .map_err(|err| abort(total, IngestError::state_query(err)))?;

            let Some(&lowest) = outdated.first() else {
                tracing::info!(total_ingested = total, "reingest: no outdated ledgers remain");
                return Ok(total);
            };

            // Only pages that still hold outdated ledgers count as iterations.
            if let Some(max) = self.limits.max_iterations {
                if iterations >= max {
                    return Err(abort(total, IngestError::SweepLimitReached { iterations }));
                }
            }
            iterations += 1;

            if self.limits.detect_stalls && previous.as_ref() == Some(&outdated) {
                return Err(abort(
                    total,
                    IngestError::SweepStalled {
                        lowest,
                        len: outdated.len(),
                    },
                ));
            }

            tracing::info!(
                lowest_sequence = lowest,
                batch_size = outdated.len(),
                "reingest: outdated"
            );

            for range in RangeBatcher::new(outdated.iter().copied()) {
                let result = self.driver.run_range(range, IngestMode::Reingest).await;
                match result.into_result() {
                    Ok(ingested) => total += ingested,
                    Err(err) => {
                        tracing::error!(%range, error = %err, "reingest of outdated range failed");
                        return Err(abort(total, err));
                    }
                }
            }

            if self.limits.detect_stalls {
                previous = Some(outdated);
            }
        }
    }
}

fn abort(ingested: u64, source: IngestError) -> IngestError {
    IngestError::SweepAborted {
        ingested,
        source: Box::new(source),
    }
}
