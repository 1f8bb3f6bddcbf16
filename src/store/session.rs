use crate::ingest::types::{IngestionVersion, LedgerRange, LedgerSequence};
use crate::runtime::error::IngestError;
use crate::runtime::telemetry::Telemetry;
use crate::store::cache::AccountCache;
use crate::store::ledger::{HistoryStore, SourceLedgerStore};
use anyhow::Result;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Parameters of one ingestion session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRequest {
    pub from: LedgerSequence,
    pub to: LedgerSequence,
    pub version: IngestionVersion,
    /// Replace history rows that already exist for the range instead of
    /// skipping them.
    pub overwrite_existing: bool,
}

impl SessionRequest {
    /// The requested bounds as a validated range.
    pub fn range(&self) -> Result<LedgerRange, IngestError> {
        LedgerRange::new(self.from, self.to)
    }
}

/// Shared handles every session is constructed with.
#[derive(Clone)]
pub struct SessionContext {
    pub history: Arc<dyn HistoryStore>,
    pub source: Arc<dyn SourceLedgerStore>,
    pub account_cache: Arc<AccountCache>,
    pub telemetry: Arc<Telemetry>,
}

/// One externally-owned unit of work that transforms and writes a contiguous
/// range of ledgers. The session owns its own transactional discipline.
pub trait IngestionSession: Send {
    fn run(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Ledgers written so far; read once `run` has returned.
    fn ingested(&self) -> u64;
}

/// Builds ingestion sessions.
pub trait SessionFactory: Send + Sync + 'static {
    fn create(&self, request: SessionRequest, context: SessionContext)
        -> Box<dyn IngestionSession>;
}
