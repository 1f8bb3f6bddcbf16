use crate::ingest::types::OrchestratorState;
use crate::runtime::error::IngestError;
use crate::store::ledger::{HistoryStore, SourceLedgerStore};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;

/// Tracks the latest sequences of the source and history stores.
///
/// The state is published through a watch channel: `refresh` is the only
/// writer and replaces both sequences at once, and only when both queries
/// succeed. Callers act on the snapshot `refresh` returns, never on an older one.
pub struct StateTracker {
    source: Arc<dyn SourceLedgerStore>,
    history: Arc<dyn HistoryStore>,
    state: watch::Sender<OrchestratorState>,
}

impl StateTracker {
    pub fn new(source: Arc<dyn SourceLedgerStore>, history: Arc<dyn HistoryStore>) -> Self {
        let (state, _) = watch::channel(OrchestratorState::default());
        Self {
            source,
            history,
            state,
        }
    }

    /// Reloads both latest sequences. On failure the previous state is kept.
    pub async fn refresh(&self) -> Result<OrchestratorState, IngestError> {
        let (core_sequence, history_sequence) = tokio::try_join!(
            async {
                self.source
                    .latest_sequence()
                    .await
                    .context("failed to load latest source ledger")
            },
            async {
                self.history
                    .latest_sequence()
                    .await
                    .context("failed to load latest history ledger")
            },
        )
        .map_err(IngestError::state_query)?;

        let next = OrchestratorState::new(core_sequence, history_sequence);
        self.state.send_replace(next);
        tracing::trace!(core_sequence, history_sequence, "ledger state refreshed");
        Ok(next)
    }

    /// Last successfully refreshed state.
    pub fn current(&self) -> OrchestratorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.state.subscribe()
    }
}
