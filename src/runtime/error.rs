use crate::ingest::types::{LedgerRange, LedgerSequence};
use crate::runtime::crash::PanicError;
use anyhow::Error as AnyError;
use core::fmt;

/// Error surfaced by the orchestrator's entry points.
#[derive(Debug)]
pub enum IngestError {
    /// Reading the latest sequence (or the outdated list) from a store failed.
    StateQuery { source: AnyError },
    /// An ingestion session failed part way through `range`.
    Session {
        range: LedgerRange,
        ingested: u64,
        source: AnyError,
    },
    /// A fault escaped an iteration and was caught at its boundary.
    Panic(PanicError),
    InvalidRange {
        start: LedgerSequence,
        end: LedgerSequence,
    },
    /// Another ingestion holds a range overlapping `requested`.
    RangeBusy {
        requested: LedgerRange,
        held: LedgerRange,
    },
    /// The outdated sweep stopped on `source` after ingesting `ingested` ledgers.
    SweepAborted {
        ingested: u64,
        source: Box<IngestError>,
    },
    /// The outdated query returned the same ledgers twice in a row.
    SweepStalled { lowest: LedgerSequence, len: usize },
    SweepLimitReached { iterations: usize },
}

impl IngestError {
    pub(crate) fn state_query(source: AnyError) -> Self {
        IngestError::StateQuery { source }
    }

    /// Ledgers written before the failure, when the error carries that count.
    pub fn ingested(&self) -> u64 {
        match self {
            IngestError::Session { ingested, .. } | IngestError::SweepAborted { ingested, .. } => {
                *ingested
            }
            _ => 0,
        }
    }

    pub fn is_state_query(&self) -> bool {
        matches!(self, IngestError::StateQuery { .. })
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::StateQuery { source } => {
                write!(f, "failed to load ledger state: {source}")
            }
            IngestError::Session {
                range,
                ingested,
                source,
            } => write!(
                f,
                "ingestion session for ledgers {range} failed after {ingested} ledgers: {source}"
            ),
            IngestError::Panic(panic) => fmt::Display::fmt(panic, f),
            IngestError::InvalidRange { start, end } => {
                write!(f, "invalid ledger range [{start}, {end}]")
            }
            IngestError::RangeBusy { requested, held } => write!(
                f,
                "ledger range {requested} overlaps in-flight ingestion of {held}"
            ),
            IngestError::SweepAborted { ingested, source } => write!(
                f,
                "outdated ledger sweep aborted after {ingested} ledgers: {source}"
            ),
            IngestError::SweepStalled { lowest, len } => write!(
                f,
                "outdated ledger sweep made no progress ({len} ledgers from {lowest} still outdated)"
            ),
            IngestError::SweepLimitReached { iterations } => write!(
                f,
                "outdated ledger sweep hit its limit of {iterations} iterations"
            ),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::StateQuery { source } | IngestError::Session { source, .. } => {
                Some(&**source)
            }
            IngestError::Panic(panic) => Some(panic),
            IngestError::SweepAborted { source, .. } => Some(&**source),
            _ => None,
        }
    }
}

impl From<PanicError> for IngestError {
    fn from(panic: PanicError) -> Self {
        IngestError::Panic(panic)
    }
}
