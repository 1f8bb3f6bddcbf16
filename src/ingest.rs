//! Ingestion orchestration: ledger state tracking, range batching, session
//! driving, the catch-up poller, and the outdated-ledger sweep.

pub mod batch;
pub mod driver;
pub mod ingester;
pub mod poller;
pub mod range_lock;
pub mod state;
mod sweep;
pub mod types;
