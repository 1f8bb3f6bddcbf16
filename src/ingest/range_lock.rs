use crate::ingest::types::LedgerRange;
use crate::runtime::error::IngestError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Registry of ledger ranges currently being ingested.
///
/// Opt-in: when enabled, overlapping requests are rejected with
/// [`IngestError::RangeBusy`] rather than queued or merged.
#[derive(Debug, Default)]
pub struct RangeLocks {
    in_flight: Arc<Mutex<Vec<LedgerRange>>>,
}

impl RangeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, range: LedgerRange) -> Result<RangeGuard, IngestError> {
        let mut in_flight = lock(&self.in_flight);
        if let Some(held) = in_flight.iter().find(|held| held.overlaps(&range)) {
            return Err(IngestError::RangeBusy {
                requested: range,
                held: *held,
            });
        }
        in_flight.push(range);
        Ok(RangeGuard {
            range,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub fn in_flight(&self) -> Vec<LedgerRange> {
        lock(&self.in_flight).clone()
    }
}

/// Releases its range when dropped.
#[derive(Debug)]
pub struct RangeGuard {
    range: LedgerRange,
    in_flight: Arc<Mutex<Vec<LedgerRange>>>,
}

impl RangeGuard {
    pub fn range(&self) -> LedgerRange {
        self.range
    }
}

impl Drop for RangeGuard {
    fn drop(&mut self) {
        let mut in_flight = lock(&self.in_flight);
        if let Some(idx) = in_flight.iter().position(|held| *held == self.range) {
            in_flight.swap_remove(idx);
        }
    }
}

fn lock(in_flight: &Mutex<Vec<LedgerRange>>) -> MutexGuard<'_, Vec<LedgerRange>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}
