use crate::Ingester;
use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Runs an [`Ingester`]'s poller until the process receives Ctrl-C.
pub struct Runner {
    ingester: Arc<Ingester>,
    shutdown: CancellationToken,
}

impl Runner {
    pub fn new(ingester: Arc<Ingester>) -> Self {
        Self {
            ingester,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a clone of the shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Handle for operator entry points that run alongside the poller.
    pub fn ingester(&self) -> Arc<Ingester> {
        self.ingester.clone()
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.ingester.start()?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        self.ingester.stop().await;
        self.shutdown = CancellationToken::new();
        Ok(())
    }
}
