//! Contracts for the collaborators the orchestrator drives: the source ledger
//! store, the history store, the ingestion session engine, and the account
//! cache shared between sessions.

pub mod cache;
pub mod ledger;
pub mod session;

pub use cache::AccountCache;
pub use ledger::{HistoryStore, SourceLedgerStore};
pub use session::{IngestionSession, SessionContext, SessionFactory, SessionRequest};
