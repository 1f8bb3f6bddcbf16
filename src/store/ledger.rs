use crate::ingest::types::{IngestionVersion, LedgerSequence};
use anyhow::Result;
use futures::future::BoxFuture;

/// Query surface of the system of record for raw ledger data.
pub trait SourceLedgerStore: Send + Sync + 'static {
    /// Latest ledger sequence available, `0` when the store is empty.
    fn latest_sequence(&self) -> BoxFuture<'_, Result<LedgerSequence>>;
}

/// Query surface of the history store populated by ingestion sessions.
pub trait HistoryStore: Send + Sync + 'static {
    /// Latest ledger sequence ingested, `0` when nothing has been ingested.
    fn latest_sequence(&self) -> BoxFuture<'_, Result<LedgerSequence>>;

    /// Up to `limit` sequences whose stored ingestion version is older than
    /// `version`, ascending and without duplicates.
    fn oldest_outdated_ledgers(
        &self,
        version: IngestionVersion,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<LedgerSequence>>>;
}
