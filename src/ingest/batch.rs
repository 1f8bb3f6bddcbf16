//! Partitions outdated ledger sequences into maximal contiguous ranges so each
//! range can be re-ingested by a single, independently retryable session.

use crate::ingest::types::{LedgerRange, LedgerSequence};

/// Lazily folds an ascending, deduplicated stream of sequences into
/// contiguous [`LedgerRange`]s, in ascending order.
#[derive(Debug, Clone)]
pub struct RangeBatcher<I> {
    sequences: I,
    open: Option<(LedgerSequence, LedgerSequence)>,
}

impl<I> RangeBatcher<I>
where
    I: Iterator<Item = LedgerSequence>,
{
    pub fn new(sequences: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            sequences: sequences.into_iter(),
            open: None,
        }
    }
}

impl<I> Iterator for RangeBatcher<I>
where
    I: Iterator<Item = LedgerSequence>,
{
    type Item = LedgerRange;

    fn next(&mut self) -> Option<LedgerRange> {
        for seq in self.sequences.by_ref() {
            if seq == 0 {
                tracing::warn!("skipping reserved ledger sequence 0 in outdated batch");
                continue;
            }

            match self.open {
                None => self.open = Some((seq, seq)),
                Some((start, end)) if end.checked_add(1) == Some(seq) => {
                    self.open = Some((start, seq));
                }
                Some((start, end)) => {
                    debug_assert!(seq > end, "outdated ledgers must be ascending and unique");
                    self.open = Some((seq, seq));
                    return Some(LedgerRange::from_run(start, end));
                }
            }
        }

        self.open
            .take()
            .map(|(start, end)| LedgerRange::from_run(start, end))
    }
}

/// Collects [`RangeBatcher`] output for a slice of sequences.
pub fn batch_ranges(outdated: &[LedgerSequence]) -> Vec<LedgerRange> {
    RangeBatcher::new(outdated.iter().copied()).collect()
}
