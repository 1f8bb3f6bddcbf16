use crate::ingest::range_lock::RangeLocks;
use crate::ingest::types::{IngestMode, IngestionVersion, LedgerRange};
use crate::runtime::error::IngestError;
use crate::store::session::{SessionContext, SessionFactory, SessionRequest};

/// Outcome of one ingestion session over one range.
#[derive(Debug)]
pub struct IngestionResult {
    pub range: LedgerRange,
    pub ingested: u64,
    pub error: Option<IngestError>,
}

impl IngestionResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<u64, IngestError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.ingested),
        }
    }
}

/// Runs exactly one ingestion session per call. Retries are the caller's job.
pub struct IngestionDriver {
    factory: Box<dyn SessionFactory>,
    context: SessionContext,
    version: IngestionVersion,
    range_locks: Option<RangeLocks>,
}

impl IngestionDriver {
    pub fn new(
        factory: Box<dyn SessionFactory>,
        context: SessionContext,
        version: IngestionVersion,
        range_locks: Option<RangeLocks>,
    ) -> Self {
        Self {
            factory,
            context,
            version,
            range_locks,
        }
    }

    pub fn version(&self) -> IngestionVersion {
        self.version
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub async fn run_range(&self, range: LedgerRange, mode: IngestMode) -> IngestionResult {
        let _guard = match self.range_locks.as_ref().map(|locks| locks.try_acquire(range)) {
            Some(Err(err)) => {
                tracing::warn!(%range, error = %err, "ledger range already being ingested");
                return IngestionResult {
                    range,
                    ingested: 0,
                    error: Some(err),
                };
            }
            Some(Ok(guard)) => Some(guard),
            None => None,
        };

        let request = SessionRequest {
            from: range.start(),
            to: range.end(),
            version: self.version,
            overwrite_existing: mode.overwrite_existing(),
        };
        let telemetry = &self.context.telemetry;
        let mut session = self.factory.create(request, self.context.clone());

        tracing::debug!(
            from = request.from,
            to = request.to,
            version = request.version,
            overwrite = request.overwrite_existing,
            "starting ingestion session"
        );
        telemetry.record_session_started();

        let outcome = session.run().await;
        let ingested = session.ingested();
        telemetry.record_ingested(ingested, request.overwrite_existing);

        let error = match outcome {
            Ok(()) => {
                tracing::debug!(%range, ingested, "ingestion session finished");
                None
            }
            Err(source) => {
                telemetry.record_session_failure();
                Some(IngestError::Session {
                    range,
                    ingested,
                    source,
                })
            }
        };

        IngestionResult {
            range,
            ingested,
            error,
        }
    }
}
