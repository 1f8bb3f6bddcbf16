use crate::runtime::error::IngestError;
use std::fmt;

/// Sequence number of one ledger in the source chain. `0` is reserved and
/// means "not yet known".
pub type LedgerSequence = u32;

/// Transform/schema version stamped on every ingested ledger.
pub type IngestionVersion = u32;

/// Version written by sessions built from this crate unless the configuration
/// overrides it. Ledgers stored under an older version are swept by
/// [`crate::Ingester::reingest_outdated`].
pub const CURRENT_VERSION: IngestionVersion = 1;

/// Latest sequences observed in the source store and the history store.
///
/// Both fields are always replaced together by a successful refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorState {
    pub core_sequence: LedgerSequence,
    pub history_sequence: LedgerSequence,
}

impl OrchestratorState {
    pub fn new(core_sequence: LedgerSequence, history_sequence: LedgerSequence) -> Self {
        Self {
            core_sequence,
            history_sequence,
        }
    }

    /// Returns the range still missing from the history store, if any.
    pub fn pending_range(&self) -> Option<LedgerRange> {
        if self.history_sequence >= self.core_sequence {
            return None;
        }
        let start = self.history_sequence.saturating_add(1);
        LedgerRange::new(start, self.core_sequence).ok()
    }
}

/// Inclusive, non-empty range of ledger sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LedgerRange {
    start: LedgerSequence,
    end: LedgerSequence,
}

impl LedgerRange {
    pub fn new(start: LedgerSequence, end: LedgerSequence) -> Result<Self, IngestError> {
        if start == 0 || start > end {
            return Err(IngestError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(sequence: LedgerSequence) -> Result<Self, IngestError> {
        Self::new(sequence, sequence)
    }

    /// Builds a range whose bounds the caller already proved valid.
    pub(crate) fn from_run(start: LedgerSequence, end: LedgerSequence) -> Self {
        debug_assert!(start != 0 && start <= end, "invalid run {start}..={end}");
        Self { start, end }
    }

    pub fn start(&self) -> LedgerSequence {
        self.start
    }

    pub fn end(&self) -> LedgerSequence {
        self.end
    }

    pub fn len(&self) -> u64 {
        u64::from(self.end - self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, sequence: LedgerSequence) -> bool {
        (self.start..=self.end).contains(&sequence)
    }

    pub fn overlaps(&self, other: &LedgerRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for LedgerRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// How a session treats history rows that already exist for its range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Append ledgers newer than the history store's latest.
    CatchUp,
    /// Overwrite existing history rows for the range.
    Reingest,
}

impl IngestMode {
    pub fn overwrite_existing(self) -> bool {
        matches!(self, IngestMode::Reingest)
    }
}
