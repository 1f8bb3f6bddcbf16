pub mod ingest;
pub mod runtime;
pub mod store;

pub use ingest::batch::{batch_ranges, RangeBatcher};
pub use ingest::driver::{IngestionDriver, IngestionResult};
pub use ingest::ingester::Ingester;
pub use ingest::poller::IterationOutcome;
pub use ingest::range_lock::{RangeGuard, RangeLocks};
pub use ingest::state::StateTracker;
pub use ingest::types::{
    IngestMode, IngestionVersion, LedgerRange, LedgerSequence, OrchestratorState, CURRENT_VERSION,
};
pub use runtime::config::{IngestConfig, IngestConfigBuilder, IngestConfigParams, SweepLimits};
pub use runtime::crash::{CrashContext, CrashReporter, LogCrashReporter, PanicError};
pub use runtime::error::IngestError;
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use store::{
    AccountCache, HistoryStore, IngestionSession, SessionContext, SessionFactory, SessionRequest,
    SourceLedgerStore,
};
